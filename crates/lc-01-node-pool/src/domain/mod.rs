//! # Domain Layer
//!
//! Score records, thresholds and errors.

pub mod errors;
pub mod thresholds;

pub use errors::{NodePoolError, NodePoolResult};
pub use thresholds::{generators_count, meets_active_percent, notarization_threshold_count};

use shared_types::Node;
use std::sync::Arc;

/// A node with its score for one hash.
#[derive(Debug, Clone)]
pub struct NodeScore {
    pub node: Arc<Node>,
    pub score: u32,
}
