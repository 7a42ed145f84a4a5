use serde::{Deserialize, Serialize};
use shared_types::{Hash, RoundNumber};

/// Entity-store key of the coordinator snapshot.
pub const SNAPSHOT_KEY: &str = "chain-snapshot";

/// Entity-store key of the persisted genesis block.
pub const GENESIS_KEY: &str = "genesis-block";

/// Entity-store key of the latest finalized block.
pub const LFB_BLOCK_KEY: &str = "lfb-block";

/// Entity-store key of the finalized block that carried the magic block
/// starting at `starting_round`.
pub fn magic_block_carrier_key(starting_round: RoundNumber) -> String {
    format!("mb-carrier-{starting_round:020}")
}

/// Durable pointers written on every LFB advance and checked on reload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainSnapshot {
    pub lfb_hash: Hash,
    pub lfb_round: RoundNumber,
    pub lfmb_hash: Hash,
    pub lfmb_starting_round: RoundNumber,
    pub current_round: RoundNumber,
}
