//! Ports consumed by the fetcher.

use crate::domain::FetchResult;
use async_trait::async_trait;
use shared_types::{Block, Context, Hash, Node, RoundNumber};
use std::sync::Arc;

/// Transport to a single peer.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Ask a miner for a notarized block.
    async fn fetch_notarized(
        &self,
        ctx: &Context,
        miner: &Node,
        hash: &Hash,
        round: RoundNumber,
    ) -> FetchResult<Block>;

    /// Ask a sharder for a finalized block.
    async fn fetch_finalized(
        &self,
        ctx: &Context,
        sharder: &Node,
        hash: &Hash,
        round: RoundNumber,
    ) -> FetchResult<Block>;
}

/// Which peers to ask, resolved against the membership covering a round.
pub trait FetchTargets: Send + Sync {
    fn miners(&self, round: RoundNumber) -> Vec<Arc<Node>>;

    /// Sharders in descending score order for the block.
    fn sharders_ranked(&self, round: RoundNumber, hash: &Hash) -> Vec<Arc<Node>>;
}

/// Integrates a fetched block before waiters are answered.
#[async_trait]
pub trait FetchCompletionHandler: Send + Sync {
    /// Returns the canonical stored block. `from_sharders` marks blocks
    /// fetched as finalized.
    async fn on_block_fetched(&self, block: Block, from_sharders: bool) -> FetchResult<Arc<Block>>;
}
