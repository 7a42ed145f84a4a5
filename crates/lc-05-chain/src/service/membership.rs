//! Magic blocks: lookup, rotation, validation and the view change applied
//! when a finalized block carries a new one.

use super::Chain;
use crate::domain::{ActivationState, ChainStats};
use crate::error::{ChainError, ChainResult};
use lc_01_node_pool::{generators_count, notarization_threshold_count};
use shared_bus::ChainEvent;
use shared_types::{short_hex, Block, Context, MagicBlock, Node, NodePool, RoundNumber};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl Chain {
    /// The magic block covering `round`.
    pub fn get_magic_block(&self, round: RoundNumber) -> ChainResult<Arc<MagicBlock>> {
        self.magic_blocks
            .read()
            .get(round)
            .ok_or(ChainError::MagicBlockNotFound(round))
    }

    pub fn latest_magic_block(&self) -> Option<Arc<MagicBlock>> {
        self.magic_blocks.read().latest()
    }

    pub fn magic_block_count(&self) -> usize {
        self.magic_blocks.read().len()
    }

    pub fn magic_block_state(&self, starting_round: RoundNumber) -> Option<ActivationState> {
        self.magic_blocks.read().state(starting_round, self.current_round())
    }

    pub fn get_miners(&self, round: RoundNumber) -> ChainResult<NodePool> {
        Ok(self.get_magic_block(round)?.miners.clone())
    }

    pub fn get_sharders(&self, round: RoundNumber) -> ChainResult<NodePool> {
        Ok(self.get_magic_block(round)?.sharders.clone())
    }

    /// Signers needed out of `miners`.
    pub fn get_notarization_threshold_count(&self, miners: usize) -> usize {
        notarization_threshold_count(miners, self.config.notarization_ratio)
    }

    pub fn generators_count(&self, miners: usize) -> usize {
        generators_count(miners, self.config.min_generators, self.config.generators_percent)
    }

    /// The round's generators: its miners with the lowest ranks.
    pub fn get_generators(&self, round: &crate::domain::Round) -> ChainResult<Vec<Arc<Node>>> {
        let mb = self.get_magic_block(round.number())?;
        let count = self.generators_count(mb.miners.size());
        let mut ranked = round.miners_by_rank(mb.miners.nodes());
        ranked.truncate(count);
        Ok(ranked)
    }

    /// The block's creator is a miner ranked among the round's generators.
    pub fn valid_generator(&self, round: &crate::domain::Round, block: &Block) -> bool {
        let Ok(mb) = self.get_magic_block(round.number()) else {
            return false;
        };
        let Some(miner) = mb.miners.get_node(&block.miner_id) else {
            return false;
        };
        let count = self.generators_count(mb.miners.size());
        round
            .miner_rank(miner.set_index)
            .map_or(false, |rank| (rank as usize) < count)
    }

    /// Swap every node of `mb` for its canonical registry handle.
    pub fn update_nodes_from_magic_block(&self, mut mb: MagicBlock) -> ChainResult<MagicBlock> {
        self.registry.canonicalize_magic_block(&mut mb)?;
        Ok(mb)
    }

    /// Persist a magic block through the saver, then store it.
    ///
    /// A saver failure leaves storage untouched, so the same magic block is
    /// applied again on the next attempt.
    pub fn set_magic_block(&self, mb: MagicBlock) -> ChainResult<bool> {
        let _membership = self.membership_lock.lock();
        self.set_magic_block_locked(mb)
    }

    fn set_magic_block_locked(&self, mb: MagicBlock) -> ChainResult<bool> {
        if !self.magic_blocks.read().admits(&mb)? {
            return Ok(false);
        }
        let saver = self.hooks.read().magic_block_saver.clone();
        if let Some(saver) = saver {
            saver.save_magic_block(&mb)?;
        }
        let mb = Arc::new(mb);
        let inserted = self.magic_blocks.write().insert(mb.clone())?;
        if inserted {
            info!(
                number = mb.magic_block_number,
                starting_round = mb.starting_round,
                miners = mb.miners.size(),
                sharders = mb.sharders.size(),
                hash = %short_hex(&mb.hash),
                "Magic block stored"
            );
        }
        Ok(inserted)
    }

    /// Rotate to `mb` if it is newer than the latest stored one.
    ///
    /// `Ok(false)` when it is already stored or not newer. Fails on an empty
    /// miner pool, a bad hash, or a broken link to the latest magic block.
    pub fn update_magic_block(&self, mb: MagicBlock) -> ChainResult<bool> {
        let _membership = self.membership_lock.lock();
        self.update_magic_block_locked(mb)
    }

    fn update_magic_block_locked(&self, mb: MagicBlock) -> ChainResult<bool> {
        if mb.miners.is_empty() {
            return Err(ChainError::InvalidMagicBlock("no miners".into()));
        }
        mb.ensure_hash()
            .map_err(|e| ChainError::InvalidMagicBlock(e.to_string()))?;

        if let Some(latest) = self.latest_magic_block() {
            if latest.hash == mb.hash {
                return Ok(false);
            }
            if mb.magic_block_number == latest.magic_block_number + 1 && mb.previous_hash != latest.hash {
                return Err(ChainError::InvalidMagicBlock(format!(
                    "magic block {} does not link to {}",
                    mb.magic_block_number, latest.magic_block_number
                )));
            }
            if mb.starting_round <= latest.starting_round {
                debug!(
                    number = mb.magic_block_number,
                    starting_round = mb.starting_round,
                    latest_starting_round = latest.starting_round,
                    "Ignoring magic block that is not newer"
                );
                return Ok(false);
            }
        }

        let mb = self.update_nodes_from_magic_block(mb)?;
        self.set_magic_block_locked(mb)
    }

    /// Check a block against the magic block covering `round`, and the
    /// magic block it carries, if any, against that one.
    pub fn validate_magic_block(&self, ctx: &Context, round: RoundNumber, block: &Block) -> ChainResult<()> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        let covering = self.get_magic_block(round)?;
        if block.latest_finalized_magic_block_hash != covering.hash {
            return Err(ChainError::invalid_block(
                &block.hash,
                format!(
                    "magic block hash {} does not match covering magic block {}",
                    short_hex(&block.latest_finalized_magic_block_hash),
                    short_hex(&covering.hash)
                ),
            ));
        }

        let Some(next) = &block.magic_block else {
            return Ok(());
        };
        next.ensure_hash()
            .map_err(|e| ChainError::InvalidMagicBlock(e.to_string()))?;
        if next.magic_block_number != covering.magic_block_number + 1 || next.previous_hash != covering.hash {
            return Err(ChainError::InvalidMagicBlock(format!(
                "magic block {} does not follow {}",
                next.magic_block_number, covering.magic_block_number
            )));
        }
        if next.starting_round <= block.round {
            return Err(ChainError::InvalidMagicBlock(format!(
                "starting round {} is not after block round {}",
                next.starting_round, block.round
            )));
        }
        Ok(())
    }

    /// Apply the magic block carried by a block being finalized.
    pub(crate) fn apply_view_change(&self, mb: &MagicBlock) -> ChainResult<()> {
        let _membership = self.membership_lock.lock();
        if !self.update_magic_block_locked(mb.clone())? {
            return Ok(());
        }
        let stored = self.magic_blocks.read().by_hash(&mb.hash);
        let Some(stored) = stored else {
            return Ok(());
        };

        ChainStats::incr(&self.stats.view_changes);
        let view_changer = self.hooks.read().view_changer.clone();
        if let Some(view_changer) = view_changer {
            if let Err(err) = view_changer.view_change(&stored) {
                warn!(number = stored.magic_block_number, error = %err, "View change hook failed");
            }
        }
        info!(
            number = stored.magic_block_number,
            starting_round = stored.starting_round,
            "View change applied"
        );
        self.emit(ChainEvent::ViewChangeApplied {
            magic_block_number: stored.magic_block_number,
            starting_round: stored.starting_round,
            magic_block_hash: stored.hash,
        });
        Ok(())
    }
}
