//! Durable coordinator pointers in the entity store.

use super::Chain;
use crate::domain::{magic_block_carrier_key, ChainSnapshot, LFB_BLOCK_KEY, SNAPSHOT_KEY};
use crate::error::{ChainError, ChainResult};
use shared_types::{decode, encode, Block};

impl Chain {
    /// Snapshot of the current LFB, LFMB and round, if genesis is set.
    pub fn snapshot(&self) -> Option<ChainSnapshot> {
        let lfb = self.latest_finalized_block()?;
        let lfmb = self.latest_finalized_magic_block()?;
        Some(ChainSnapshot {
            lfb_hash: lfb.hash,
            lfb_round: lfb.round,
            lfmb_hash: lfmb.hash,
            lfmb_starting_round: lfmb.starting_round,
            current_round: self.current_round(),
        })
    }

    pub(crate) fn write_snapshot(&self) -> ChainResult<()> {
        let Some(snapshot) = self.snapshot() else {
            return Ok(());
        };
        self.entity_store
            .write(&self.config.config_info_db, SNAPSHOT_KEY, encode(&snapshot)?)
    }

    /// Persist a block that just became the LFB, then the snapshot pointing
    /// at it. A block carrying a magic block is also kept as that magic
    /// block's carrier.
    pub(crate) fn persist_finalized(&self, block: &Block) -> ChainResult<()> {
        let db = &self.config.config_info_db;
        let bytes = encode(block)?;
        if let Some(mb) = &block.magic_block {
            self.entity_store
                .write(db, &magic_block_carrier_key(mb.starting_round), bytes.clone())?;
        }
        self.entity_store.write(db, LFB_BLOCK_KEY, bytes)?;
        self.write_snapshot()
    }

    pub fn read_snapshot(&self) -> ChainResult<Option<ChainSnapshot>> {
        match self.entity_store.read(&self.config.config_info_db, SNAPSHOT_KEY)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The persisted LFB and the block that carried its magic block, ready
    /// for [`Chain::add_loaded_finalized_blocks`]. `None` before the first
    /// snapshot.
    pub fn load_finalized_blocks(&self) -> ChainResult<Option<(Block, Block)>> {
        let Some(snapshot) = self.read_snapshot()? else {
            return Ok(None);
        };
        let db = &self.config.config_info_db;
        let Some(bytes) = self.entity_store.read(db, LFB_BLOCK_KEY)? else {
            return Ok(None);
        };
        let lfb: Block = decode(&bytes)?;
        if lfb.hash != snapshot.lfb_hash {
            return Err(ChainError::invalid_block(&lfb.hash, "persisted LFB does not match the snapshot"));
        }
        let carrier = self
            .entity_store
            .read(db, &magic_block_carrier_key(snapshot.lfmb_starting_round))?
            .ok_or(ChainError::MagicBlockNotFound(snapshot.lfmb_starting_round))?;
        Ok(Some((lfb, decode(&carrier)?)))
    }
}
