//! Genesis and startup reload.

use super::Chain;
use crate::domain::{Round, GENESIS_KEY};
use crate::error::{ChainError, ChainResult};
use lc_02_state_trie::EMPTY_ROOT;
use shared_bus::ChainEvent;
use shared_types::{decode, encode, from_hex, hash_bytes, short_hex, Block, MagicBlock};
use std::sync::Arc;
use tracing::info;

/// Seed of round 0.
pub const GENESIS_RANDOM_SEED: u64 = 839_695_260_482_366_273;

/// Creation time stamped on the genesis header, unix seconds.
pub const GENESIS_CREATION_DATE: u64 = 1_676_096_659;

impl Chain {
    /// Build the genesis round and block for chain identity `hash` and the
    /// initial magic block. Nothing is stored until
    /// [`Chain::add_genesis_block`].
    ///
    /// A hex `hash` is the chain id itself; anything else is hashed into one.
    pub fn generate_genesis_block(&self, hash: &str, mb: MagicBlock) -> ChainResult<(Arc<Round>, Block)> {
        mb.ensure_hash()
            .map_err(|e| ChainError::InvalidMagicBlock(e.to_string()))?;
        let chain_id = from_hex(hash).unwrap_or_else(|_| hash_bytes(hash.as_bytes()));

        let miners = mb.miners.size();
        let block = Block::builder(0)
            .chain_id(chain_id)
            .state_root(EMPTY_ROOT)
            .random_seed(GENESIS_RANDOM_SEED)
            .creation_date(GENESIS_CREATION_DATE)
            .latest_finalized_magic_block_hash(mb.hash)
            .magic_block(mb)
            .build();

        let round = Arc::new(self.create_round(0));
        round.set_random_seed(GENESIS_RANDOM_SEED, miners);
        round.add_notarized_block(Arc::new(block.clone()), 0);
        round.finalize(block.hash);
        Ok((round, block))
    }

    /// Install genesis: its magic block, LFB/LDB, round 0 and the persisted
    /// copy. Only once. An existing snapshot is left in place.
    pub fn add_genesis_block(&self, block: Block) -> ChainResult<Arc<Block>> {
        if self.genesis.read().is_some() {
            return Err(ChainError::GenesisAlreadySet);
        }
        if block.round != 0 || block.prev_hash.is_some() {
            return Err(ChainError::invalid_block(&block.hash, "genesis must be round 0 without a predecessor"));
        }
        block
            .ensure_hash()
            .map_err(|e| ChainError::invalid_block(&block.hash, e.to_string()))?;
        let mb = block
            .magic_block
            .clone()
            .ok_or_else(|| ChainError::invalid_block(&block.hash, "genesis carries no magic block"))?;

        self.update_magic_block(mb)?;
        let mb = self.get_magic_block(0)?;

        let genesis = self.blocks.write().insert(block).block;
        {
            let mut slot = self.genesis.write();
            if slot.is_some() {
                return Err(ChainError::GenesisAlreadySet);
            }
            *slot = Some(genesis.clone());
        }
        *self.chain_id.write() = genesis.chain_id;
        *self.state_root.write() = genesis.state_root;
        *self.lfmb.write() = Some(mb.clone());
        self.set_lfb(genesis.clone());
        self.set_ldb(genesis.clone());

        let round = self.get_or_create_round(0);
        round.set_random_seed(genesis.round_random_seed, mb.miners.size());
        round.add_notarized_block(genesis.clone(), 0);
        round.finalize(genesis.hash);

        self.entity_store
            .write(&self.config.config_info_db, GENESIS_KEY, encode(&*genesis)?)?;
        // A snapshot from an earlier run is restored through
        // `add_loaded_finalized_blocks`, not replaced.
        if self.read_snapshot()?.is_none() {
            self.persist_finalized(&genesis)?;
        }

        info!(
            hash = %short_hex(&genesis.hash),
            miners = mb.miners.size(),
            sharders = mb.sharders.size(),
            "Genesis block added"
        );
        self.emit(ChainEvent::GenesisInitialized {
            block_hash: genesis.hash,
        });
        Ok(genesis)
    }

    /// The genesis block persisted by an earlier run.
    pub fn load_genesis_block(&self) -> ChainResult<Option<Block>> {
        match self.entity_store.read(&self.config.config_info_db, GENESIS_KEY)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Restore the finalized chain tip at startup, bypassing notarization.
    ///
    /// `lfmb` is the block that carried the magic block governing `lfb`.
    /// Both must match the persisted snapshot when one exists.
    pub fn add_loaded_finalized_blocks(&self, lfb: Block, lfmb: Block) -> ChainResult<Arc<Block>> {
        for block in [&lfb, &lfmb] {
            block
                .ensure_hash()
                .map_err(|e| ChainError::invalid_block(&block.hash, e.to_string()))?;
        }
        let mb = lfmb
            .magic_block
            .clone()
            .ok_or_else(|| ChainError::invalid_block(&lfmb.hash, "carries no magic block"))?;
        if lfb.round < lfmb.round {
            return Err(ChainError::invalid_block(
                &lfb.hash,
                format!("LFB round {} is below its magic block's round {}", lfb.round, lfmb.round),
            ));
        }
        if let Some(snapshot) = self.read_snapshot()? {
            if snapshot.lfb_hash != lfb.hash || snapshot.lfmb_hash != mb.hash {
                return Err(ChainError::invalid_block(
                    &lfb.hash,
                    format!(
                        "does not match persisted LFB {} at round {}",
                        short_hex(&snapshot.lfb_hash),
                        snapshot.lfb_round
                    ),
                ));
            }
        }

        self.update_magic_block(mb)?;
        let (lfb, lfmb) = {
            let mut blocks = self.blocks.write();
            let lfmb = blocks.insert(lfmb).block;
            let lfb = blocks.insert(lfb).block;
            (lfb, lfmb)
        };

        let covering = self.get_magic_block(lfb.round)?;
        *self.lfmb.write() = Some(covering);
        *self.state_root.write() = lfb.state_root;
        if self.genesis.read().is_none() && lfmb.is_genesis() {
            *self.genesis.write() = Some(lfmb.clone());
        }
        self.set_lfb(lfb.clone());
        self.set_ldb(lfb.clone());

        let round = self.get_or_create_round(lfb.round);
        self.set_random_seed(&round, lfb.round_random_seed);
        round.finalize(lfb.hash);
        self.set_current_round(lfb.round);

        info!(
            round = lfb.round,
            hash = %short_hex(&lfb.hash),
            lfmb_round = lfmb.round,
            "Loaded finalized blocks"
        );
        Ok(lfb)
    }
}
