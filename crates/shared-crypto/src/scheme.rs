//! # Signature Schemes
//!
//! The chain is parameterized by a scheme *name*; the concrete algorithm is
//! resolved once at setup and shared behind `Arc<dyn SignatureScheme>`.

use crate::ed25519::{Ed25519KeyPair, Ed25519Scheme};
use crate::secp256k1::{Secp256k1KeyPair, Secp256k1Scheme};
use crate::CryptoError;
use std::sync::Arc;

/// Scheme name for Ed25519.
pub const ED25519: &str = "ed25519";

/// Scheme name for ECDSA over secp256k1.
pub const SECP256K1: &str = "secp256k1";

/// Verification side of a signature algorithm.
pub trait SignatureScheme: Send + Sync {
    /// Registered name.
    fn name(&self) -> &'static str;

    /// Check `signature` over `message` against raw public key bytes.
    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError>;
}

/// Signing side: a key pair bound to one scheme.
pub trait SigningKeyPair: Send + Sync {
    /// Name of the scheme that verifies this key's signatures.
    fn scheme_name(&self) -> &'static str;

    /// Raw public key bytes as stored on `Node::public_key`.
    fn public_key_bytes(&self) -> Vec<u8>;

    /// Deterministic signature over `message`.
    fn sign(&self, message: &[u8]) -> Vec<u8>;
}

/// Resolve a scheme by name. Names are case-insensitive.
pub fn resolve_scheme(name: &str) -> Result<Arc<dyn SignatureScheme>, CryptoError> {
    match name.to_ascii_lowercase().as_str() {
        ED25519 => Ok(Arc::new(Ed25519Scheme)),
        SECP256K1 => Ok(Arc::new(Secp256k1Scheme)),
        _ => Err(CryptoError::UnknownScheme(name.to_string())),
    }
}

/// Build a key pair for the named scheme from a 32-byte seed.
pub fn keypair_from_seed(name: &str, seed: [u8; 32]) -> Result<Box<dyn SigningKeyPair>, CryptoError> {
    match name.to_ascii_lowercase().as_str() {
        ED25519 => Ok(Box::new(Ed25519KeyPair::from_seed(seed))),
        SECP256K1 => Ok(Box::new(Secp256k1KeyPair::from_bytes(seed)?)),
        _ => Err(CryptoError::UnknownScheme(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_schemes() {
        assert_eq!(resolve_scheme("ed25519").unwrap().name(), ED25519);
        assert_eq!(resolve_scheme("SECP256K1").unwrap().name(), SECP256K1);
    }

    #[test]
    fn test_resolve_unknown_scheme() {
        let err = resolve_scheme("bls0chain").err().unwrap();
        assert_eq!(err, CryptoError::UnknownScheme("bls0chain".into()));
    }

    #[test]
    fn test_seeded_keypairs_verify_under_resolved_scheme() {
        for name in [ED25519, SECP256K1] {
            let keypair = keypair_from_seed(name, [7u8; 32]).unwrap();
            let scheme = resolve_scheme(keypair.scheme_name()).unwrap();
            let sig = keypair.sign(b"block-hash");
            assert!(scheme.verify(&keypair.public_key_bytes(), b"block-hash", &sig).is_ok());
            assert!(scheme.verify(&keypair.public_key_bytes(), b"other", &sig).is_err());
        }
    }
}
