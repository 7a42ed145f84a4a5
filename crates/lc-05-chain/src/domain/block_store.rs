//! # Block Store
//!
//! Blocks keyed by content hash, with the predecessor links finalization
//! needs. Blocks reference their predecessor by hash only; the store
//! resolves the link.

use shared_types::{Block, Hash, RoundNumber};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Result of [`BlockStore::insert`].
#[derive(Debug)]
pub struct Inserted {
    /// The block now in the store; the pre-existing one on a duplicate.
    pub block: Arc<Block>,
    /// Whether this call added a new entry.
    pub is_new: bool,
    /// A duplicate replaced the stored copy to carry its proof.
    pub proof_upgraded: bool,
    /// The predecessor is not in the store.
    pub missing_previous: bool,
    /// Children whose "no previous" flag this block cleared.
    pub released: Vec<Hash>,
}

#[derive(Debug, Default)]
pub struct BlockStore {
    blocks: HashMap<Hash, Arc<Block>>,
    /// Blocks finalization must not walk past until their predecessor arrives.
    no_previous: HashSet<Hash>,
    /// prev hash -> children hashes
    children: HashMap<Hash, Vec<Hash>>,
    /// Blocks whose notarization proof already verified.
    notarized: HashSet<Hash>,
}

impl BlockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.blocks.get(hash).cloned()
    }

    pub fn contains(&self, hash: &Hash) -> bool {
        self.blocks.contains_key(hash)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Insert a block, or return the stored one for its hash.
    ///
    /// A duplicate that brings a notarization proof the stored copy lacks
    /// replaces it; block identity does not cover the proof.
    pub fn insert(&mut self, block: Block) -> Inserted {
        if let Some(existing) = self.blocks.get(&block.hash) {
            if existing.notarization.is_some() || block.notarization.is_none() {
                return Inserted {
                    block: existing.clone(),
                    is_new: false,
                    proof_upgraded: false,
                    missing_previous: false,
                    released: Vec::new(),
                };
            }
            let upgraded = Arc::new(block);
            self.blocks.insert(upgraded.hash, upgraded.clone());
            return Inserted {
                block: upgraded,
                is_new: false,
                proof_upgraded: true,
                missing_previous: false,
                released: Vec::new(),
            };
        }

        let hash = block.hash;
        let missing_previous = match block.prev_hash {
            Some(prev) => {
                self.children.entry(prev).or_default().push(hash);
                !self.blocks.contains_key(&prev)
            }
            None => false,
        };
        if missing_previous {
            self.no_previous.insert(hash);
        }

        let released: Vec<Hash> = self
            .children
            .get(&hash)
            .map(|children| {
                children
                    .iter()
                    .filter(|child| self.no_previous.contains(*child))
                    .copied()
                    .collect()
            })
            .unwrap_or_default();
        for child in &released {
            self.no_previous.remove(child);
        }

        let block = Arc::new(block);
        self.blocks.insert(hash, block.clone());
        Inserted {
            block,
            is_new: true,
            proof_upgraded: false,
            missing_previous,
            released,
        }
    }

    pub fn is_no_previous(&self, hash: &Hash) -> bool {
        self.no_previous.contains(hash)
    }

    pub fn mark_notarized(&mut self, hash: Hash) {
        if self.blocks.contains_key(&hash) {
            self.notarized.insert(hash);
        }
    }

    pub fn is_notarized(&self, hash: &Hash) -> bool {
        self.notarized.contains(hash)
    }

    /// Blocks of one round, in hash order.
    pub fn round_blocks(&self, round: RoundNumber) -> Vec<Arc<Block>> {
        let mut blocks: Vec<Arc<Block>> = self
            .blocks
            .values()
            .filter(|b| b.round == round)
            .cloned()
            .collect();
        blocks.sort_by(|a, b| a.hash.cmp(&b.hash));
        blocks
    }

    /// Stored blocks whose previous hash is `hash`.
    pub fn children_of(&self, hash: &Hash) -> Vec<Arc<Block>> {
        self.children
            .get(hash)
            .map(|children| children.iter().filter_map(|c| self.blocks.get(c).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn remove(&mut self, hash: &Hash) -> Option<Arc<Block>> {
        let removed = self.blocks.remove(hash)?;
        self.no_previous.remove(hash);
        self.notarized.remove(hash);
        if let Some(prev) = removed.prev_hash {
            if let Some(siblings) = self.children.get_mut(&prev) {
                siblings.retain(|c| c != hash);
                if siblings.is_empty() {
                    self.children.remove(&prev);
                }
            }
        }
        Some(removed)
    }

    /// Remove every block with `round < below` except those `keep` selects.
    pub fn delete_below(&mut self, below: RoundNumber, keep: impl Fn(&Block) -> bool) -> usize {
        let doomed: Vec<Hash> = self
            .blocks
            .values()
            .filter(|b| b.round < below && !keep(b))
            .map(|b| b.hash)
            .collect();
        for hash in &doomed {
            self.remove(hash);
        }
        doomed.len()
    }

    /// State roots of blocks at or above `round`.
    pub fn state_roots_from(&self, round: RoundNumber) -> Vec<Hash> {
        let mut roots: Vec<Hash> = self
            .blocks
            .values()
            .filter(|b| b.round >= round)
            .map(|b| b.state_root)
            .collect();
        roots.sort();
        roots.dedup();
        roots
    }
}
