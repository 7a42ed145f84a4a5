//! Process-wide chain slot for callers that cannot be handed an `Arc<Chain>`.
//!
//! Prefer passing the chain explicitly; this exists for request handlers
//! registered before the chain is built.

use crate::service::Chain;
use parking_lot::{const_rwlock, RwLock};
use std::sync::Arc;

static SERVER_CHAIN: RwLock<Option<Arc<Chain>>> = const_rwlock(None);

/// Install the node's chain, returning the one it replaces.
pub fn set_server_chain(chain: Arc<Chain>) -> Option<Arc<Chain>> {
    SERVER_CHAIN.write().replace(chain)
}

pub fn server_chain() -> Option<Arc<Chain>> {
    SERVER_CHAIN.read().clone()
}

pub fn clear_server_chain() -> Option<Arc<Chain>> {
    SERVER_CHAIN.write().take()
}
