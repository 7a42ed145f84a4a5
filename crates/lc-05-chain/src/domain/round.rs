//! # Rounds
//!
//! A round's record: seed, miner ranks, proposed and notarized blocks, and
//! the finalized winner. Each round serializes its own updates behind its
//! own lock.
//!
//! ```text
//!   New ──seed──► Seeded ──block──► Proposing ──proof──► Notarized ──► Finalized
//!                   ▲                   │
//!                   └──retry (new seed)─┴── TimedOut ◄── generate timeout
//! ```

use lc_01_node_pool::miner_permutation;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared_types::{Block, Hash, Node, RoundNumber};
use std::sync::Arc;

/// Rank of a block whose generator has no rank in the round.
pub const UNRANKED: u32 = u32::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RoundPhase {
    New,
    Seeded,
    Proposing,
    Notarized,
    TimedOut,
    Finalized,
}

/// A block together with its generator's rank in the round.
#[derive(Debug, Clone)]
pub struct RankedBlock {
    pub block: Arc<Block>,
    pub rank: u32,
}

impl RankedBlock {
    /// Lowest rank first, then hash.
    fn precedes(&self, other: &RankedBlock) -> bool {
        (self.rank, self.block.hash) < (other.rank, other.block.hash)
    }
}

#[derive(Debug)]
struct RoundInner {
    random_seed: Option<u64>,
    /// `ranks[set_index]` is that miner's rank.
    ranks: Vec<usize>,
    timeout_count: u32,
    phase: RoundPhase,
    proposed: Vec<RankedBlock>,
    notarized: Vec<RankedBlock>,
    finalized: Option<Hash>,
}

#[derive(Debug)]
pub struct Round {
    number: RoundNumber,
    inner: RwLock<RoundInner>,
}

impl Round {
    pub fn new(number: RoundNumber) -> Self {
        Self {
            number,
            inner: RwLock::new(RoundInner {
                random_seed: None,
                ranks: Vec::new(),
                timeout_count: 0,
                phase: RoundPhase::New,
                proposed: Vec::new(),
                notarized: Vec::new(),
                finalized: None,
            }),
        }
    }

    pub fn number(&self) -> RoundNumber {
        self.number
    }

    pub fn phase(&self) -> RoundPhase {
        self.inner.read().phase
    }

    pub fn random_seed(&self) -> Option<u64> {
        self.inner.read().random_seed
    }

    pub fn has_random_seed(&self) -> bool {
        self.inner.read().random_seed.is_some()
    }

    pub fn timeout_count(&self) -> u32 {
        self.inner.read().timeout_count
    }

    /// Install the seed for `miners` miners. Only the first call wins; a zero
    /// seed is never installed.
    pub fn set_random_seed(&self, seed: u64, miners: usize) -> bool {
        if seed == 0 {
            return false;
        }
        let mut inner = self.inner.write();
        if inner.random_seed.is_some() {
            return false;
        }
        inner.random_seed = Some(seed);
        inner.ranks = miner_permutation(seed, miners);
        if inner.phase == RoundPhase::New {
            inner.phase = RoundPhase::Seeded;
        }
        true
    }

    /// Restart the round with a new seed after a timeout.
    ///
    /// A notarized round only moves to a seed from a later timeout; a
    /// finalized round never does. The timeout count never goes down.
    pub fn retry_with_seed(&self, seed: u64, miners: usize, timeout_count: u32) -> bool {
        let mut inner = self.inner.write();
        let blocked = match inner.phase {
            RoundPhase::Finalized => true,
            RoundPhase::Notarized => timeout_count <= inner.timeout_count,
            _ => false,
        };
        if seed == 0 || blocked {
            return false;
        }
        inner.random_seed = Some(seed);
        inner.ranks = miner_permutation(seed, miners);
        inner.timeout_count = inner.timeout_count.max(timeout_count);
        inner.proposed.clear();
        inner.phase = RoundPhase::Seeded;
        true
    }

    /// Generator timeout. Returns whether the round moved to `TimedOut`.
    pub fn on_timeout(&self) -> bool {
        let mut inner = self.inner.write();
        match inner.phase {
            RoundPhase::Notarized | RoundPhase::Finalized => false,
            _ => {
                inner.timeout_count += 1;
                inner.phase = RoundPhase::TimedOut;
                true
            }
        }
    }

    /// Rank of the miner at `set_index`, if the round is seeded for it.
    pub fn miner_rank(&self, set_index: usize) -> Option<u32> {
        self.inner.read().ranks.get(set_index).map(|rank| *rank as u32)
    }

    /// `miners` ordered by rank in this round. Unranked miners go last.
    pub fn miners_by_rank(&self, miners: &[Arc<Node>]) -> Vec<Arc<Node>> {
        let inner = self.inner.read();
        let mut sorted: Vec<Arc<Node>> = miners.to_vec();
        sorted.sort_by_key(|node| inner.ranks.get(node.set_index).copied().unwrap_or(usize::MAX));
        sorted
    }

    pub fn add_proposed_block(&self, block: Arc<Block>, rank: u32) -> bool {
        let mut inner = self.inner.write();
        if inner.proposed.iter().any(|p| p.block.hash == block.hash) {
            return false;
        }
        inner.proposed.push(RankedBlock { block, rank });
        if inner.phase == RoundPhase::Seeded {
            inner.phase = RoundPhase::Proposing;
        }
        true
    }

    pub fn proposed_blocks(&self) -> Vec<RankedBlock> {
        self.inner.read().proposed.clone()
    }

    /// Add to the notarized set, which only grows. Returns false for a block
    /// already in it.
    pub fn add_notarized_block(&self, block: Arc<Block>, rank: u32) -> bool {
        let mut inner = self.inner.write();
        if inner.notarized.iter().any(|n| n.block.hash == block.hash) {
            return false;
        }
        inner.notarized.push(RankedBlock { block, rank });
        if inner.phase != RoundPhase::Finalized {
            inner.phase = RoundPhase::Notarized;
        }
        true
    }

    pub fn notarized_blocks(&self) -> Vec<RankedBlock> {
        self.inner.read().notarized.clone()
    }

    pub fn has_notarized_blocks(&self) -> bool {
        !self.inner.read().notarized.is_empty()
    }

    pub fn best_ranked_notarized(&self) -> Option<RankedBlock> {
        best_ranked(&self.inner.read().notarized).cloned()
    }

    pub fn finalize(&self, hash: Hash) {
        let mut inner = self.inner.write();
        inner.finalized = Some(hash);
        inner.phase = RoundPhase::Finalized;
    }

    pub fn finalized_hash(&self) -> Option<Hash> {
        self.inner.read().finalized
    }

    pub fn is_finalized(&self) -> bool {
        self.inner.read().finalized.is_some()
    }
}

/// Allocates round records.
pub trait RoundFactory: Send + Sync {
    fn create_round(&self, number: RoundNumber) -> Round;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRoundFactory;

impl RoundFactory for DefaultRoundFactory {
    fn create_round(&self, number: RoundNumber) -> Round {
        Round::new(number)
    }
}

/// Pick the finalization winner among candidates.
pub fn best_ranked(candidates: &[RankedBlock]) -> Option<&RankedBlock> {
    candidates
        .iter()
        .fold(None, |best: Option<&RankedBlock>, c| match best {
            Some(b) if !c.precedes(b) => Some(b),
            _ => Some(c),
        })
}
