//! Driven ports (outbound dependencies and hooks)

use crate::error::ChainResult;
use async_trait::async_trait;
use shared_types::{Block, Context, Hash, MagicBlock, RoundNumber};
use std::sync::Arc;

/// Keyed entity persistence, split into namespaces.
pub trait EntityStore: Send + Sync {
    fn read(&self, namespace: &str, key: &str) -> ChainResult<Option<Vec<u8>>>;

    fn write(&self, namespace: &str, key: &str, value: Vec<u8>) -> ChainResult<()>;

    fn delete(&self, namespace: &str, key: &str) -> ChainResult<()>;
}

/// Durable write of each activated magic block.
pub trait MagicBlockSaver: Send + Sync {
    fn save_magic_block(&self, mb: &MagicBlock) -> ChainResult<()>;
}

/// Invoked once per applied view change, under the membership lock.
///
/// Must not call back into membership operations.
pub trait ViewChanger: Send + Sync {
    fn view_change(&self, mb: &Arc<MagicBlock>) -> ChainResult<()>;
}

/// Invoked after a fetched block has been integrated.
#[async_trait]
pub trait AfterFetcher: Send + Sync {
    async fn after_fetch(&self, ctx: &Context, block: &Arc<Block>) -> ChainResult<()>;
}

/// Invoked when a notarized block arrived by fetch rather than push.
#[async_trait]
pub trait FetchedNotarizedBlockHandler: Send + Sync {
    async fn notarized_block_fetched(&self, ctx: &Context, block: &Arc<Block>) -> ChainResult<()>;
}

/// Peers that serve encoded state-trie nodes by hash.
#[async_trait]
pub trait StateNodeSource: Send + Sync {
    /// Returns `(hash, encoded)` pairs for the hashes the peer has.
    async fn fetch_state_nodes(&self, ctx: &Context, hashes: &[Hash]) -> ChainResult<Vec<(Hash, Vec<u8>)>>;
}

/// A per-round storage that retention trims from the oldest end.
pub trait RoundStorage: Send + Sync {
    fn name(&self) -> &str;

    /// Stored rounds, ascending.
    fn rounds(&self) -> Vec<RoundNumber>;

    /// Drop everything strictly below `round`.
    fn prune_below(&self, round: RoundNumber) -> ChainResult<()>;
}

/// Random seeds for rounds. A retry after `timeout_count` timeouts must
/// get a different seed than the attempt before it.
pub trait SeedSource: Send + Sync {
    fn round_seed(&self, round: RoundNumber, lfb_hash: &Hash, timeout_count: u32) -> u64;
}
