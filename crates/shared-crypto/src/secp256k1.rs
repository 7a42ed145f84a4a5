//! # ECDSA (secp256k1)
//!
//! RFC 6979 deterministic nonces. Public keys are SEC1-compressed (33 bytes),
//! signatures are `r || s` (64 bytes).

use crate::scheme::{SignatureScheme, SigningKeyPair, SECP256K1};
use crate::CryptoError;
use k256::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};

/// Verifier for secp256k1 ECDSA signatures.
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Scheme;

impl SignatureScheme for Secp256k1Scheme {
    fn name(&self) -> &'static str {
        SECP256K1
    }

    fn verify(&self, public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), CryptoError> {
        let verifying_key =
            VerifyingKey::from_sec1_bytes(public_key).map_err(|_| CryptoError::InvalidPublicKey)?;
        let sig = Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignatureFormat)?;

        verifying_key
            .verify(message, &sig)
            .map_err(|_| CryptoError::SignatureVerificationFailed)
    }
}

/// secp256k1 ECDSA keypair.
pub struct Secp256k1KeyPair {
    signing_key: SigningKey,
}

impl Secp256k1KeyPair {
    /// Generate random keypair.
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut rand::thread_rng()),
        }
    }

    /// Create from secret key bytes; rejects zero and out-of-range scalars.
    pub fn from_bytes(bytes: [u8; 32]) -> Result<Self, CryptoError> {
        let signing_key =
            SigningKey::from_bytes((&bytes).into()).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing_key })
    }
}

impl SigningKeyPair for Secp256k1KeyPair {
    fn scheme_name(&self) -> &'static str {
        SECP256K1
    }

    fn public_key_bytes(&self) -> Vec<u8> {
        self.signing_key.verifying_key().to_sec1_bytes().to_vec()
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        let sig: Signature = self.signing_key.sign(message);
        sig.to_bytes().to_vec()
    }
}
