//! # Ports
//!
//! The scorer seam. The chain only needs "rank this pool for this key";
//! tests swap in fixed scores.

use crate::domain::NodeScore;
use shared_types::{Hash, NodePool};

/// Scores a pool for a key, best first.
pub trait PoolScorer: Send + Sync {
    /// Scores sorted descending, ties by node id.
    fn score_hash(&self, pool: &NodePool, key: &Hash) -> Vec<NodeScore>;
}
