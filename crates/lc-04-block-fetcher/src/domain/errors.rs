use shared_types::{ContextError, RoundNumber};
use thiserror::Error;

/// Fetch failures. Cloned to every waiter of a hash.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// No peer returned the block.
    #[error("block {0} not found on any peer")]
    NotFound(String),

    /// Too many hashes in flight, or the request queue is full.
    #[error("block fetcher busy")]
    Backpressure,

    /// The fetcher shut down or the caller's context fired.
    #[error("block fetch cancelled")]
    Cancelled,

    /// The coordinator no longer wants blocks of this round.
    #[error("round {0} is below the retention window")]
    Stale(RoundNumber),

    /// A peer answered with a block that failed validation.
    #[error("invalid block: {0}")]
    Invalid(String),

    /// Transport failure talking to a peer.
    #[error("peer error: {0}")]
    Source(String),

    /// The fetcher worker has exited.
    #[error("block fetcher closed")]
    Closed,
}

impl From<ContextError> for FetchError {
    fn from(_: ContextError) -> Self {
        FetchError::Cancelled
    }
}

impl FetchError {
    /// Whether another peer might still have the block.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::NotFound(_) | FetchError::Invalid(_) | FetchError::Source(_)
        )
    }
}

pub type FetchResult<T> = Result<T, FetchError>;
