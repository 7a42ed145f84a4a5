use crate::algorithms::score_nodes;
use crate::domain::NodeScore;
use crate::ports::PoolScorer;
use shared_types::{Hash, NodePool};

/// Keccak rendezvous scorer.
#[derive(Debug, Clone, Copy, Default)]
pub struct HashPoolScorer;

impl PoolScorer for HashPoolScorer {
    fn score_hash(&self, pool: &NodePool, key: &Hash) -> Vec<NodeScore> {
        score_nodes(pool.nodes(), key)
    }
}
