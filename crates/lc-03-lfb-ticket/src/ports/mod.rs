//! Outbound ports of the ticket worker.

use crate::domain::LfbTicket;
use async_trait::async_trait;
use shared_types::{Node, NodeId};
use std::sync::Arc;

/// Delivers a ticket to the miners and sharders of the magic block that
/// covers its round.
#[async_trait]
pub trait TicketBroadcaster: Send + Sync {
    /// Best effort; delivery failures are the adapter's to log.
    async fn broadcast(&self, ticket: &LfbTicket);
}

/// Lookup of sharders able to issue tickets.
pub trait SharderDirectory: Send + Sync {
    /// The sharder with this id, or `None` for unknown nodes and miners.
    fn sharder(&self, id: &NodeId) -> Option<Arc<Node>>;
}
