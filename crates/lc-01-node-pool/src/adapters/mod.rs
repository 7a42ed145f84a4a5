//! # Adapters
//!
//! Concrete scorer and the node registry.

pub mod hash_scorer;
pub mod registry;

pub use hash_scorer::HashPoolScorer;
pub use registry::NodeRegistry;
