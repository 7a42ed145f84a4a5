//! Counters the coordinator exposes for operators.

use serde::{Deserialize, Serialize};
use shared_types::RoundNumber;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct ChainStats {
    pub blocks_added: AtomicU64,
    pub duplicate_blocks: AtomicU64,
    pub invalid_blocks: AtomicU64,
    pub rounds_added: AtomicU64,
    pub rounds_deleted: AtomicU64,
    pub notarized_blocks: AtomicU64,
    pub finalized_blocks: AtomicU64,
    pub view_changes: AtomicU64,
    pub round_timeouts: AtomicU64,
    pub fetch_requests: AtomicU64,
}

impl ChainStats {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add(counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ChainStatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        ChainStatsSnapshot {
            blocks_added: load(&self.blocks_added),
            duplicate_blocks: load(&self.duplicate_blocks),
            invalid_blocks: load(&self.invalid_blocks),
            rounds_added: load(&self.rounds_added),
            rounds_deleted: load(&self.rounds_deleted),
            notarized_blocks: load(&self.notarized_blocks),
            finalized_blocks: load(&self.finalized_blocks),
            view_changes: load(&self.view_changes),
            round_timeouts: load(&self.round_timeouts),
            fetch_requests: load(&self.fetch_requests),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainStatsSnapshot {
    pub blocks_added: u64,
    pub duplicate_blocks: u64,
    pub invalid_blocks: u64,
    pub rounds_added: u64,
    pub rounds_deleted: u64,
    pub notarized_blocks: u64,
    pub finalized_blocks: u64,
    pub view_changes: u64,
    pub round_timeouts: u64,
    pub fetch_requests: u64,
}

/// Fees over finalized transactions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeStats {
    pub max_fees: u64,
    pub mean_fees: u64,
    pub min_fees: u64,
    pub count: u64,
    #[serde(skip)]
    total: u128,
}

impl FeeStats {
    pub fn record(&mut self, fee: u64) {
        if self.count == 0 {
            self.min_fees = fee;
            self.max_fees = fee;
        } else {
            self.min_fees = self.min_fees.min(fee);
            self.max_fees = self.max_fees.max(fee);
        }
        self.count += 1;
        self.total += u128::from(fee);
        self.mean_fees = (self.total / u128::from(self.count)) as u64;
    }
}

/// Outcome of the last `prune_chain`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PruneStats {
    /// Round of the block pruning ran for.
    pub round: RoundNumber,
    /// Trie nodes reachable from blocks at or above this round were kept.
    pub retained_from: RoundNumber,
    pub blocks_deleted: u64,
    pub state: lc_02_state_trie::PruneStats,
}
