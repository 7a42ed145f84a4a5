//! Sharding-eligibility predicates. Pure functions of the round's magic
//! block, the block hash, the node and the scorer.

use super::Chain;
use lc_01_node_pool::{is_in_top, meets_active_percent, top_nodes, NodeScore};
use shared_types::{Block, Hash, MagicBlock, Node, NodeId, NodePool, RoundNumber};
use std::sync::Arc;

impl Chain {
    /// `round` only selects the magic block; scores depend on the hash alone.
    fn sharder_scores(&self, round: RoundNumber, hash: &Hash) -> Option<(Arc<MagicBlock>, Vec<NodeScore>)> {
        let mb = self.get_magic_block(round).ok()?;
        let scores = self.scorer.score_hash(&mb.sharders, hash);
        Some((mb, scores))
    }

    /// Sharders of the covering magic block, best score first.
    pub fn ranked_sharders(&self, round: RoundNumber, hash: &Hash) -> Vec<Arc<Node>> {
        self.sharder_scores(round, hash)
            .map(|(_, scores)| scores.into_iter().map(|s| s.node).collect())
            .unwrap_or_default()
    }

    pub fn is_block_sharder(&self, block: &Block, sharder: &Node) -> bool {
        self.is_block_sharder_from_hash(block.round, &block.hash, sharder)
    }

    /// Whether `sharder` scores within the replication factor for the block.
    /// Everyone stores everything when replication is disabled.
    pub fn is_block_sharder_from_hash(&self, round: RoundNumber, hash: &Hash, sharder: &Node) -> bool {
        if self.config.replication_factor == 0 {
            return true;
        }
        self.sharder_scores(round, hash)
            .map_or(false, |(_, scores)| is_in_top(&scores, &sharder.id, self.config.replication_factor))
    }

    /// Whether `sharder` stores the block, plus the sharders that do.
    pub fn can_shard_block_with_replicators(
        &self,
        round: RoundNumber,
        hash: &Hash,
        sharder: &Node,
    ) -> (bool, Vec<Arc<Node>>) {
        let Some((mb, scores)) = self.sharder_scores(round, hash) else {
            return (false, Vec::new());
        };
        if self.config.replication_factor == 0 {
            return (true, mb.sharders.nodes().to_vec());
        }
        let top = top_nodes(&scores, self.config.replication_factor);
        let eligible = top.iter().any(|n| n.id == sharder.id);
        (eligible, top)
    }

    /// Sharders that store the block.
    pub fn get_block_sharders(&self, block: &Block) -> Vec<NodeId> {
        let Some((mb, scores)) = self.sharder_scores(block.round, &block.hash) else {
            return Vec::new();
        };
        if self.config.replication_factor == 0 {
            return mb.sharders.node_ids();
        }
        top_nodes(&scores, self.config.replication_factor)
            .iter()
            .map(|n| n.id)
            .collect()
    }

    pub fn can_shard_blocks(&self, round: RoundNumber) -> bool {
        self.get_magic_block(round)
            .map_or(false, |mb| self.can_shard_blocks_sharders(&mb.sharders))
    }

    /// Enough of the pool is active to shard blocks.
    pub fn can_shard_blocks_sharders(&self, sharders: &NodePool) -> bool {
        meets_active_percent(sharders.active_count(), sharders.size(), self.config.min_active_sharders)
    }

    /// Enough of the block's replicators are active.
    pub fn can_replicate_block(&self, block: &Block) -> bool {
        let factor = self.config.replication_factor;
        if factor == 0 || self.config.min_active_replicators == 0 {
            return self.can_shard_blocks(block.round);
        }
        let Some((_, scores)) = self.sharder_scores(block.round, &block.hash) else {
            return false;
        };
        if scores.is_empty() {
            return self.can_shard_blocks(block.round);
        }
        let active = top_nodes(&scores, factor).iter().filter(|n| n.is_active()).count();
        meets_active_percent(active, factor, self.config.min_active_replicators)
    }

    /// Enough miners are active to notarize and enough sharders to store.
    pub fn can_start_network(&self) -> bool {
        let Ok(mb) = self.get_magic_block(self.current_round()) else {
            return false;
        };
        let threshold = self.get_notarization_threshold_count(mb.miners.size());
        mb.miners.active_count() >= threshold && self.can_shard_blocks_sharders(&mb.sharders)
    }
}
