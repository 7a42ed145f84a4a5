//! # Magic Block Storage
//!
//! Membership snapshots ordered by starting round. The snapshot covering a
//! round is the one with the greatest starting round at or below it.
//!
//! ```text
//!   start:   0            100          250
//!            │ mb#1        │ mb#2        │ mb#3 (pending)
//!   round ───┼─────────────┼─────────────┼──────►
//!                  ▲ current = 180: mb#1 superseded, mb#2 active
//! ```

use crate::error::{ChainError, ChainResult};
use serde::{Deserialize, Serialize};
use shared_types::{Hash, MagicBlock, RoundNumber};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationState {
    /// Starting round not reached yet.
    Pending,
    Active,
    /// A later snapshot is active.
    Superseded,
}

#[derive(Debug, Default)]
pub struct MagicBlockStorage {
    by_start: BTreeMap<RoundNumber, Arc<MagicBlock>>,
}

impl MagicBlockStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a snapshot. Starting rounds are unique: the same snapshot again
    /// is a no-op (`Ok(false)`), a different one is a conflict.
    pub fn insert(&mut self, mb: Arc<MagicBlock>) -> ChainResult<bool> {
        if !self.admits(&mb)? {
            return Ok(false);
        }
        self.by_start.insert(mb.starting_round, mb);
        Ok(true)
    }

    /// Whether [`insert`](Self::insert) would add `mb`, without adding it.
    pub fn admits(&self, mb: &MagicBlock) -> ChainResult<bool> {
        match self.by_start.get(&mb.starting_round) {
            Some(existing) if existing.hash == mb.hash => Ok(false),
            Some(_) => Err(ChainError::MagicBlockConflict(mb.starting_round)),
            None => Ok(true),
        }
    }

    /// Snapshot covering `round`.
    pub fn get(&self, round: RoundNumber) -> Option<Arc<MagicBlock>> {
        self.by_start.range(..=round).next_back().map(|(_, mb)| mb.clone())
    }

    pub fn latest(&self) -> Option<Arc<MagicBlock>> {
        self.by_start.values().next_back().cloned()
    }

    pub fn by_hash(&self, hash: &Hash) -> Option<Arc<MagicBlock>> {
        self.by_start.values().find(|mb| &mb.hash == hash).cloned()
    }

    pub fn by_number(&self, number: u64) -> Option<Arc<MagicBlock>> {
        self.by_start
            .values()
            .find(|mb| mb.magic_block_number == number)
            .cloned()
    }

    /// Activation state of the snapshot starting at `starting_round`.
    pub fn state(&self, starting_round: RoundNumber, current_round: RoundNumber) -> Option<ActivationState> {
        if !self.by_start.contains_key(&starting_round) {
            return None;
        }
        if starting_round > current_round {
            return Some(ActivationState::Pending);
        }
        let active_start = self.by_start.range(..=current_round).next_back().map(|(s, _)| *s);
        if active_start == Some(starting_round) {
            Some(ActivationState::Active)
        } else {
            Some(ActivationState::Superseded)
        }
    }

    /// Snapshots whose starting round lies in `(from, to]`.
    pub fn activated_between(&self, from: RoundNumber, to: RoundNumber) -> Vec<Arc<MagicBlock>> {
        if to <= from {
            return Vec::new();
        }
        self.by_start
            .range(from + 1..=to)
            .map(|(_, mb)| mb.clone())
            .collect()
    }

    pub fn starting_rounds(&self) -> Vec<RoundNumber> {
        self.by_start.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.by_start.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_start.is_empty()
    }
}
