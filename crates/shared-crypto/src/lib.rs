//! # Shared Crypto - Signature Schemes
//!
//! ## Components
//!
//! | Module | Algorithm | Use Case |
//! |--------|-----------|----------|
//! | `ed25519` | Ed25519 | Notarization tickets, LFB tickets |
//! | `secp256k1` | ECDSA secp256k1 | Same, for networks configured with it |
//! | `scheme` | - | Resolution by name, signing trait |
//!
//! ## Security Properties
//!
//! - **Ed25519**: Deterministic nonces, no RNG dependency
//! - **secp256k1**: RFC 6979 deterministic, low-S normalization

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod ed25519;
pub mod errors;
pub mod scheme;
pub mod secp256k1;

pub use ed25519::{Ed25519KeyPair, Ed25519Scheme};
pub use errors::CryptoError;
pub use scheme::{keypair_from_seed, resolve_scheme, SignatureScheme, SigningKeyPair, ED25519, SECP256K1};
pub use secp256k1::{Secp256k1KeyPair, Secp256k1Scheme};
