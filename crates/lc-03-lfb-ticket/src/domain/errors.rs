use shared_crypto::CryptoError;
use shared_types::NodeId;
use thiserror::Error;

/// Ticket service errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LfbTicketError {
    /// The issuer is not a sharder this node knows about.
    #[error("unknown sharder: {0}")]
    UnknownSharder(NodeId),

    /// The ticket carries no signature.
    #[error("ticket from {0} is not signed")]
    Unsigned(NodeId),

    /// Signature does not verify against the issuer's key.
    #[error("invalid ticket signature: {0}")]
    InvalidSignature(CryptoError),

    /// Signing payload could not be encoded.
    #[error("ticket encoding failed: {0}")]
    Codec(String),

    /// The command queue is full.
    #[error("ticket worker queue full")]
    Backpressure,

    /// The worker has exited.
    #[error("ticket worker stopped")]
    Stopped,

    /// The caller's context fired first.
    #[error("ticket request cancelled: {0}")]
    Cancelled(#[from] shared_types::ContextError),
}

pub type LfbTicketResult<T> = Result<T, LfbTicketError>;
