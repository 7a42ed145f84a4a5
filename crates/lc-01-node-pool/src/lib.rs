//! # LC-01 Node Pool
//!
//! Deterministic selection over membership pools.
//!
//! **Architecture:** Hexagonal (Domain + Ports/Adapters)
//!
//! ## Purpose
//!
//! Every node must reach the same answer to "who stores this block?" and
//! "who may generate in this round?" without talking to anyone:
//!
//! - **Sharder assignment**: rendezvous scores over `Keccak256(node || key)`;
//!   the top `replication_factor` sharders (ties included) store the block.
//! - **Generator ranks**: the round seed drives a Fisher-Yates permutation of
//!   miner set indices; the lowest ranks are the round's generators.
//! - **Thresholds**: notarization and activity checks in integer percent.
//! - **Registry**: one canonical handle per node so liveness is shared
//!   across magic blocks.
//!
//! ## Module Structure
//!
//! ```text
//! lc-01-node-pool/
//! ├── domain/          # NodeScore, thresholds, errors
//! ├── algorithms/      # scoring, miner permutation
//! ├── ports/           # PoolScorer
//! └── adapters/        # HashPoolScorer, NodeRegistry
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod algorithms;
pub mod domain;
pub mod ports;

// Re-exports
pub use adapters::{HashPoolScorer, NodeRegistry};
pub use algorithms::{is_in_top, miner_permutation, score_node, score_nodes, top_nodes};
pub use domain::{
    generators_count, meets_active_percent, notarization_threshold_count, NodePoolError,
    NodePoolResult, NodeScore,
};
pub use ports::PoolScorer;
