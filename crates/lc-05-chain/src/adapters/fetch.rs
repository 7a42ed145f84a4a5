//! Block fetcher ports resolved against the chain. Both hold a weak
//! reference: the chain owns the fetcher handle, not the other way round.

use crate::error::{ChainError, ErrorKind};
use crate::service::Chain;
use async_trait::async_trait;
use lc_04_block_fetcher::{FetchCompletionHandler, FetchError, FetchResult, FetchTargets};
use shared_types::{Block, Hash, Node, RoundNumber};
use std::sync::{Arc, Weak};

/// Fetch peers from the magic block covering the round.
pub struct ChainFetchTargets {
    chain: Weak<Chain>,
}

impl ChainFetchTargets {
    pub fn new(chain: Weak<Chain>) -> Self {
        Self { chain }
    }
}

impl FetchTargets for ChainFetchTargets {
    fn miners(&self, round: RoundNumber) -> Vec<Arc<Node>> {
        self.chain
            .upgrade()
            .and_then(|chain| chain.get_magic_block(round).ok())
            .map(|mb| mb.miners.nodes().to_vec())
            .unwrap_or_default()
    }

    fn sharders_ranked(&self, round: RoundNumber, hash: &Hash) -> Vec<Arc<Node>> {
        self.chain
            .upgrade()
            .map(|chain| chain.ranked_sharders(round, hash))
            .unwrap_or_default()
    }
}

/// Hands fetched blocks to [`Chain::on_block_fetched`].
pub struct ChainFetchCompletion {
    chain: Weak<Chain>,
}

impl ChainFetchCompletion {
    pub fn new(chain: Weak<Chain>) -> Self {
        Self { chain }
    }
}

#[async_trait]
impl FetchCompletionHandler for ChainFetchCompletion {
    async fn on_block_fetched(&self, block: Block, from_sharders: bool) -> FetchResult<Arc<Block>> {
        let chain = self.chain.upgrade().ok_or(FetchError::Closed)?;
        chain
            .on_block_fetched(block, from_sharders)
            .await
            .map_err(to_fetch_error)
    }
}

fn to_fetch_error(err: ChainError) -> FetchError {
    match (&err, err.kind()) {
        (ChainError::Stale { round, .. }, _) => FetchError::Stale(*round),
        (_, ErrorKind::Invalid) => FetchError::Invalid(err.to_string()),
        (_, ErrorKind::Cancelled) => FetchError::Cancelled,
        (_, ErrorKind::Backpressure) => FetchError::Backpressure,
        _ => FetchError::Source(err.to_string()),
    }
}
