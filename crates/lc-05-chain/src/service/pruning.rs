//! Retention: block store and state-trie pruning.

use super::Chain;
use crate::domain::PruneStats;
use crate::error::ChainResult;
use shared_bus::ChainEvent;
use shared_types::{Block, Context, Hash};
use tracing::info;

impl Chain {
    /// Prune state unreachable from blocks at or above
    /// `block.round - retention_window`, and drop stored blocks below both
    /// that round and the LDB.
    pub fn prune_chain(&self, ctx: &Context, block: &Block) -> ChainResult<PruneStats> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        let retained_from = block.round.saturating_sub(self.config.retention_window);

        let mut roots: Vec<Hash> = self.blocks.read().state_roots_from(retained_from);
        roots.push(block.state_root);
        roots.push(self.state_root());
        roots.sort();
        roots.dedup();

        let state = self.trie.prune(&roots, block.round)?;

        let ldb_round = self.latest_deterministic_block().map(|b| b.round).unwrap_or(0);
        let below = retained_from.min(ldb_round);
        let genesis = self.genesis_block().map(|g| g.hash);
        let lfb = self.latest_finalized_block().map(|b| b.hash);
        let blocks_deleted = self
            .blocks
            .write()
            .delete_below(below, |b| Some(b.hash) == genesis || Some(b.hash) == lfb) as u64;

        let stats = PruneStats {
            round: block.round,
            retained_from,
            blocks_deleted,
            state,
        };
        info!(
            round = block.round,
            retained_from,
            blocks_deleted,
            nodes_deleted = stats.state.deleted,
            nodes_retained = stats.state.retained,
            "Chain pruned"
        );
        self.emit(ChainEvent::StatePruned {
            round: block.round,
            deleted: stats.state.deleted,
        });
        *self.prune_stats.write() = Some(stats.clone());
        Ok(stats)
    }
}
