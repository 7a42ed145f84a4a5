//! In-process broadcasters.

use crate::domain::LfbTicket;
use crate::ports::TicketBroadcaster;
use crate::service::LfbTicketHandle;
use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::Context;
use tracing::debug;

/// Drops every ticket. Used by miners and nodes without transport.
#[derive(Debug, Default)]
pub struct NullBroadcaster;

#[async_trait]
impl TicketBroadcaster for NullBroadcaster {
    async fn broadcast(&self, ticket: &LfbTicket) {
        debug!(round = ticket.round, "Ticket broadcast skipped (no transport)");
    }
}

/// Hands tickets to peer workers running in the same process.
///
/// Each peer verifies the ticket as if it had arrived over the network.
#[derive(Default)]
pub struct LocalBroadcaster {
    peers: RwLock<Vec<LfbTicketHandle>>,
}

impl LocalBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_peer(&self, peer: LfbTicketHandle) {
        self.peers.write().push(peer);
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }
}

#[async_trait]
impl TicketBroadcaster for LocalBroadcaster {
    async fn broadcast(&self, ticket: &LfbTicket) {
        let peers = self.peers.read().clone();
        let ctx = Context::background();
        for peer in peers {
            if let Err(e) = peer.receive(&ctx, ticket.clone()).await {
                debug!(round = ticket.round, error = %e, "Peer rejected ticket");
            }
        }
    }
}
