//! Peer transport stand-ins.
//!
//! No wire protocol is linked into the devnet runtime, so every remote
//! request fails fast with a source error and the fetcher moves on.

use async_trait::async_trait;
use lc_04_block_fetcher::{BlockSource, FetchError, FetchResult};
use shared_types::{short_hex, Block, Context, Hash, Node, RoundNumber};
use tracing::debug;

/// A [`BlockSource`] with no peers behind it.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineBlockSource;

impl OfflineBlockSource {
    fn unavailable(peer: &Node, hash: &Hash, round: RoundNumber) -> FetchError {
        debug!(peer = %peer.id, hash = %short_hex(hash), round, "No transport for block request");
        FetchError::Source("no transport configured".into())
    }
}

#[async_trait]
impl BlockSource for OfflineBlockSource {
    async fn fetch_notarized(
        &self,
        _ctx: &Context,
        miner: &Node,
        hash: &Hash,
        round: RoundNumber,
    ) -> FetchResult<Block> {
        Err(Self::unavailable(miner, hash, round))
    }

    async fn fetch_finalized(
        &self,
        _ctx: &Context,
        sharder: &Node,
        hash: &Hash,
        round: RoundNumber,
    ) -> FetchResult<Block> {
        Err(Self::unavailable(sharder, hash, round))
    }
}
