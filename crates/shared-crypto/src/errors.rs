//! Crypto error types.

use thiserror::Error;

/// Signature scheme errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CryptoError {
    /// No scheme registered under this name
    #[error("Unknown signature scheme: {0}")]
    UnknownScheme(String),

    /// Public key bytes do not decode to a curve point
    #[error("Invalid public key")]
    InvalidPublicKey,

    /// Private key bytes are out of range
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Signature bytes are malformed
    #[error("Invalid signature format")]
    InvalidSignatureFormat,

    /// Signature is well-formed but does not verify
    #[error("Signature verification failed")]
    SignatureVerificationFailed,
}
