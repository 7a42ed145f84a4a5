use serde::{Deserialize, Serialize};
use shared_types::RoundNumber;

/// Outcome of one prune pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneStats {
    /// Round the pass was run for.
    pub round: RoundNumber,
    /// Nodes reached from the retained roots.
    pub visited: u64,
    /// Nodes kept.
    pub retained: u64,
    /// Nodes removed.
    pub deleted: u64,
    /// Referenced nodes that were not in the database.
    pub missing: u64,
    /// Wall time of the pass, milliseconds.
    pub elapsed_ms: u64,
}
