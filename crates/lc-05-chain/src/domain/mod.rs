pub mod block_store;
pub mod magic_block_storage;
pub mod round;
pub mod round_store;
pub mod snapshot;
pub mod stats;

pub use block_store::{BlockStore, Inserted};
pub use magic_block_storage::{ActivationState, MagicBlockStorage};
pub use round::{best_ranked, DefaultRoundFactory, RankedBlock, Round, RoundFactory, RoundPhase, UNRANKED};
pub use round_store::RoundStore;
pub use snapshot::{magic_block_carrier_key, ChainSnapshot, GENESIS_KEY, LFB_BLOCK_KEY, SNAPSHOT_KEY};
pub use stats::{ChainStats, ChainStatsSnapshot, FeeStats, PruneStats};
