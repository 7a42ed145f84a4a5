use crate::error::ChainResult;
use crate::ports::{EntityStore, MagicBlockSaver};
use shared_types::{decode, encode, MagicBlock, RoundNumber};
use std::sync::Arc;

/// Entity-store namespace for magic blocks.
pub const MAGIC_BLOCK_NAMESPACE: &str = "magicblock";

/// Sorted starting rounds of every saved magic block.
const INDEX_KEY: &str = "index";

/// Persists magic blocks keyed by zero-padded starting round, so key order
/// is starting-round order.
pub struct EntityStoreMagicBlockSaver {
    store: Arc<dyn EntityStore>,
}

impl EntityStoreMagicBlockSaver {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    pub fn key(starting_round: RoundNumber) -> String {
        format!("{starting_round:020}")
    }

    pub fn load(&self, starting_round: RoundNumber) -> ChainResult<Option<MagicBlock>> {
        match self.store.read(MAGIC_BLOCK_NAMESPACE, &Self::key(starting_round))? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Every saved magic block, oldest first.
    pub fn load_all(&self) -> ChainResult<Vec<MagicBlock>> {
        let mut saved = Vec::new();
        for starting_round in self.starting_rounds()? {
            if let Some(mb) = self.load(starting_round)? {
                saved.push(mb);
            }
        }
        Ok(saved)
    }

    pub fn starting_rounds(&self) -> ChainResult<Vec<RoundNumber>> {
        match self.store.read(MAGIC_BLOCK_NAMESPACE, INDEX_KEY)? {
            Some(bytes) => Ok(decode(&bytes)?),
            None => Ok(Vec::new()),
        }
    }
}

impl MagicBlockSaver for EntityStoreMagicBlockSaver {
    fn save_magic_block(&self, mb: &MagicBlock) -> ChainResult<()> {
        self.store
            .write(MAGIC_BLOCK_NAMESPACE, &Self::key(mb.starting_round), encode(mb)?)?;
        let mut rounds = self.starting_rounds()?;
        if let Err(at) = rounds.binary_search(&mb.starting_round) {
            rounds.insert(at, mb.starting_round);
            self.store.write(MAGIC_BLOCK_NAMESPACE, INDEX_KEY, encode(&rounds)?)?;
        }
        Ok(())
    }
}
