use super::Hash;
use shared_types::to_hex;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Trie node not found: {}", to_hex(.0))]
    NodeNotFound(Hash),

    #[error("Trie node hash mismatch: expected {}, got {}", to_hex(.expected), to_hex(.actual))]
    HashMismatch { expected: Hash, actual: Hash },

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type StateResult<T> = Result<T, StateError>;
