//! # Domain Errors
//!
//! Error types for the node pool subsystem.

use shared_types::NodeId;
use thiserror::Error;

/// Node pool error types.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodePoolError {
    /// Node is not registered.
    #[error("Unknown node: {0}")]
    UnknownNode(NodeId),

    /// The same id was registered with a different public key.
    #[error("Node {0} re-registered with a different public key")]
    KeyMismatch(NodeId),

    /// A ratio or percentage outside 0..=100.
    #[error("Invalid percentage: {0}")]
    InvalidPercentage(u32),
}

/// Result alias for node pool operations.
pub type NodePoolResult<T> = Result<T, NodePoolError>;
