//! # Chain Errors
//!
//! One enum for the coordinator, classified by [`ErrorKind`] so callers can
//! decide between fetch-and-retry, back off, and give up without matching
//! every variant.

use lc_01_node_pool::NodePoolError;
use lc_02_state_trie::StateError;
use lc_04_block_fetcher::FetchError;
use shared_crypto::CryptoError;
use shared_types::{to_hex, ContextError, EntityError, RoundNumber};
use thiserror::Error;

/// Coarse classification of a [`ChainError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Absent locally; a fetch may recover it.
    NotFound,
    /// Below the retention window. Not recoverable.
    Stale,
    /// Structural or cryptographic check failed. Never retried.
    Invalid,
    /// A singleton was already set; state unchanged.
    Conflict,
    Cancelled,
    /// A queue is full; retry after a wait.
    Backpressure,
    /// A collaborator (entity store, saver, trie database) failed.
    Storage,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("block {0} not found")]
    BlockNotFound(String),

    #[error("round {0} not found")]
    RoundNotFound(RoundNumber),

    #[error("no magic block covers round {0}")]
    MagicBlockNotFound(RoundNumber),

    #[error("state node {0} not found")]
    StateNodeNotFound(String),

    /// The ancestor walk hit the deterministic boundary without a verdict.
    #[error("insufficient chain: reached round {0} without finding the transaction")]
    InsufficientChain(RoundNumber),

    #[error("round {round} is below the retention window (floor {floor})")]
    Stale { round: RoundNumber, floor: RoundNumber },

    #[error("invalid block {hash}: {reason}")]
    InvalidBlock { hash: String, reason: String },

    #[error("invalid notarization for {hash}: {reason}")]
    InvalidNotarization { hash: String, reason: String },

    #[error("invalid magic block: {0}")]
    InvalidMagicBlock(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("genesis block already set")]
    GenesisAlreadySet,

    #[error("magic block with starting round {0} already stored with a different hash")]
    MagicBlockConflict(RoundNumber),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("{0} is full")]
    Backpressure(&'static str),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("node pool error: {0}")]
    NodePool(#[from] NodePoolError),
}

impl ChainError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChainError::BlockNotFound(_)
            | ChainError::RoundNotFound(_)
            | ChainError::MagicBlockNotFound(_)
            | ChainError::StateNodeNotFound(_)
            | ChainError::InsufficientChain(_) => ErrorKind::NotFound,
            ChainError::Stale { .. } => ErrorKind::Stale,
            ChainError::InvalidBlock { .. }
            | ChainError::InvalidNotarization { .. }
            | ChainError::InvalidMagicBlock(_)
            | ChainError::InvalidState(_)
            | ChainError::Config(_) => ErrorKind::Invalid,
            ChainError::GenesisAlreadySet | ChainError::MagicBlockConflict(_) => ErrorKind::Conflict,
            ChainError::Cancelled(_) => ErrorKind::Cancelled,
            ChainError::Backpressure(_) => ErrorKind::Backpressure,
            ChainError::Storage(_) => ErrorKind::Storage,
            ChainError::NodePool(NodePoolError::UnknownNode(_)) => ErrorKind::NotFound,
            ChainError::NodePool(_) => ErrorKind::Invalid,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub(crate) fn invalid_block(hash: &shared_types::Hash, reason: impl Into<String>) -> Self {
        ChainError::InvalidBlock {
            hash: to_hex(hash),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_notarization(hash: &shared_types::Hash, reason: impl Into<String>) -> Self {
        ChainError::InvalidNotarization {
            hash: to_hex(hash),
            reason: reason.into(),
        }
    }
}

impl From<StateError> for ChainError {
    fn from(err: StateError) -> Self {
        match err {
            StateError::NodeNotFound(hash) => ChainError::StateNodeNotFound(to_hex(&hash)),
            StateError::HashMismatch { .. } => ChainError::InvalidState(err.to_string()),
            StateError::Database(_) | StateError::Serialization(_) => {
                ChainError::Storage(err.to_string())
            }
        }
    }
}

impl From<FetchError> for ChainError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::NotFound(hash) => ChainError::BlockNotFound(hash),
            FetchError::Source(reason) => ChainError::BlockNotFound(reason),
            FetchError::Backpressure => ChainError::Backpressure("block fetcher"),
            FetchError::Cancelled | FetchError::Closed => ChainError::Cancelled(err.to_string()),
            FetchError::Stale(round) => ChainError::Stale { round, floor: round },
            FetchError::Invalid(reason) => ChainError::InvalidBlock {
                hash: String::from("fetched"),
                reason,
            },
        }
    }
}

impl From<EntityError> for ChainError {
    fn from(err: EntityError) -> Self {
        match err {
            EntityError::Codec(reason) => ChainError::Storage(reason),
            other => ChainError::InvalidState(other.to_string()),
        }
    }
}

impl From<CryptoError> for ChainError {
    fn from(err: CryptoError) -> Self {
        ChainError::Config(err.to_string())
    }
}

impl From<ContextError> for ChainError {
    fn from(err: ContextError) -> Self {
        ChainError::Cancelled(err.to_string())
    }
}

pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lower_errors_keep_their_kind() {
        let state: ChainError = StateError::NodeNotFound([1u8; 32]).into();
        assert_eq!(state.kind(), ErrorKind::NotFound);

        let fetch: ChainError = FetchError::Backpressure.into();
        assert_eq!(fetch.kind(), ErrorKind::Backpressure);

        let cancelled: ChainError = ContextError::DeadlineExceeded.into();
        assert_eq!(cancelled.kind(), ErrorKind::Cancelled);

        let db: ChainError = StateError::Database("disk".into()).into();
        assert_eq!(db.kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_singletons_are_conflicts() {
        assert_eq!(ChainError::GenesisAlreadySet.kind(), ErrorKind::Conflict);
        assert_eq!(ChainError::MagicBlockConflict(100).kind(), ErrorKind::Conflict);
    }
}
