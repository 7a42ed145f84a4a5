//! # Error Types
//!
//! Errors raised while decoding or validating shared entities.

use thiserror::Error;

/// Errors produced by entity parsing, encoding and integrity checks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EntityError {
    /// Input was not valid hexadecimal.
    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    /// Decoded bytes had the wrong length.
    #[error("Invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// Binary encoding or decoding failed.
    #[error("Codec error: {0}")]
    Codec(String),

    /// Stored hash does not match the recomputed one.
    #[error("Hash mismatch: stored {stored}, computed {computed}")]
    HashMismatch { stored: String, computed: String },
}

/// Result type for entity operations.
pub type EntityResult<T> = Result<T, EntityError>;
