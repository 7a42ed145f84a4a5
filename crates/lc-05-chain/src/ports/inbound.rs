//! Driving port: what network handlers and the runtime call.

use crate::domain::ChainStatsSnapshot;
use crate::error::ChainResult;
use async_trait::async_trait;
use shared_types::{Block, Context, Hash, MagicBlock, RoundNumber};
use std::sync::Arc;

/// Chain coordinator API.
#[async_trait]
pub trait ChainApi: Send + Sync {
    /// Idempotent insert; returns the stored block.
    fn add_block(&self, block: Block) -> ChainResult<Arc<Block>>;

    /// Local lookup. A miss schedules a fetch and reports `NotFound`.
    fn get_block(&self, ctx: &Context, hash: &Hash) -> ChainResult<Arc<Block>>;

    /// Local lookup, falling back to awaiting the fetcher.
    async fn fetch_block(&self, ctx: &Context, hash: Hash, round: RoundNumber) -> ChainResult<Arc<Block>>;

    fn latest_finalized_block(&self) -> Option<Arc<Block>>;

    fn current_round(&self) -> RoundNumber;

    fn get_magic_block(&self, round: RoundNumber) -> ChainResult<Arc<MagicBlock>>;

    fn stats(&self) -> ChainStatsSnapshot;
}
