//! # Sharder Scoring
//!
//! Rendezvous ("highest random weight") scoring: every node gets a score
//! per key, and the top scorers store the block. Adding a sharder only moves
//! the blocks it now wins.

use crate::domain::NodeScore;
use sha3::{Digest, Keccak256};
use shared_types::{Hash, Node, NodeId};
use std::sync::Arc;

/// `Keccak256(node_id || key)`, first four bytes big-endian.
pub fn score_node(node_id: &NodeId, key: &Hash) -> u32 {
    let mut input = [0u8; 64];
    input[..32].copy_from_slice(&node_id.0);
    input[32..].copy_from_slice(key);
    let digest = Keccak256::digest(input);
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Score every node and sort descending, ties by node id.
pub fn score_nodes<'a>(nodes: impl IntoIterator<Item = &'a Arc<Node>>, key: &Hash) -> Vec<NodeScore> {
    let mut scores: Vec<NodeScore> = nodes
        .into_iter()
        .map(|node| NodeScore {
            score: score_node(&node.id, key),
            node: node.clone(),
        })
        .collect();
    scores.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.node.id.cmp(&b.node.id)));
    scores
}

/// Score of the `top_n`-th entry; anything scoring at least this is "top".
fn boundary_score(scores: &[NodeScore], top_n: usize) -> Option<u32> {
    if top_n == 0 || scores.is_empty() {
        return None;
    }
    let index = top_n.min(scores.len()) - 1;
    Some(scores[index].score)
}

/// Whether `id` ranks within the first `top_n` scores.
///
/// Nodes tied with the boundary score qualify.
pub fn is_in_top(scores: &[NodeScore], id: &NodeId, top_n: usize) -> bool {
    let Some(boundary) = boundary_score(scores, top_n) else {
        return false;
    };
    scores
        .iter()
        .take_while(|s| s.score >= boundary)
        .any(|s| &s.node.id == id)
}

/// Every node scoring at or above the `top_n`-th score, in score order.
pub fn top_nodes(scores: &[NodeScore], top_n: usize) -> Vec<Arc<Node>> {
    let Some(boundary) = boundary_score(scores, top_n) else {
        return Vec::new();
    };
    scores
        .iter()
        .take_while(|s| s.score >= boundary)
        .map(|s| s.node.clone())
        .collect()
}
