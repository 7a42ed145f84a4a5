use serde::{Deserialize, Serialize};
use shared_types::{Hash, NodeId, RoundNumber};

/// What to fetch and where to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub hash: Hash,
    pub round: RoundNumber,
    /// Skip miners; the block is known to be finalized.
    pub sharders_only: bool,
    /// Sharder to ask before the ranked list, e.g. a ticket issuer.
    pub sharder_hint: Option<NodeId>,
}

impl FetchRequest {
    pub fn notarized(hash: Hash, round: RoundNumber) -> Self {
        Self {
            hash,
            round,
            sharders_only: false,
            sharder_hint: None,
        }
    }

    pub fn finalized(hash: Hash, round: RoundNumber, sharder_hint: Option<NodeId>) -> Self {
        Self {
            hash,
            round,
            sharders_only: true,
            sharder_hint,
        }
    }
}

/// Snapshot of fetcher load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchQueueStats {
    /// Attempts currently talking to miners.
    pub miners: usize,
    /// Attempts currently talking to sharders.
    pub sharders: usize,
    /// Distinct hashes being fetched.
    pub in_flight: usize,
    /// Round of the latest LFB ticket seen.
    pub lfb_ticket_round: u64,
    pub completed: u64,
    pub failed: u64,
}
