//! # Algorithms Module
//!
//! Sharder scoring and generator ranking.

pub mod permutation;
pub mod scoring;

pub use permutation::miner_permutation;
pub use scoring::{is_in_top, score_node, score_nodes, top_nodes};
