//! Round lifecycle, seeds and notarized sets.

use super::Chain;
use crate::domain::{ChainStats, Round, UNRANKED};
use crate::error::{ChainError, ChainResult};
use crate::ports::RoundStorage;
use shared_bus::ChainEvent;
use shared_types::{short_hex, Block, Context, RoundNumber};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, info, warn};

impl Chain {
    /// A fresh round record from the configured factory.
    pub fn create_round(&self, number: RoundNumber) -> Round {
        self.round_factory.create_round(number)
    }

    /// Store a round. Returns the stored one if the number is taken.
    pub fn add_round(&self, round: Round) -> Arc<Round> {
        let (round, added) = self.rounds.write().add(round);
        if added {
            ChainStats::incr(&self.stats.rounds_added);
            debug!(round = round.number(), "Round added");
        }
        round
    }

    pub fn get_round(&self, number: RoundNumber) -> ChainResult<Arc<Round>> {
        self.rounds
            .read()
            .get(number)
            .ok_or(ChainError::RoundNotFound(number))
    }

    pub fn get_or_create_round(&self, number: RoundNumber) -> Arc<Round> {
        if let Some(round) = self.rounds.read().get(number) {
            return round;
        }
        self.add_round(self.create_round(number))
    }

    pub fn delete_round(&self, number: RoundNumber) -> bool {
        let removed = self.rounds.write().remove(number).is_some();
        if removed {
            ChainStats::incr(&self.stats.rounds_deleted);
        }
        removed
    }

    /// Drop every round strictly below `number`.
    pub fn delete_rounds_below(&self, number: RoundNumber) -> usize {
        let removed = self.rounds.write().delete_below(number);
        if removed > 0 {
            ChainStats::add(&self.stats.rounds_deleted, removed as u64);
            debug!(below = number, removed, "Rounds deleted");
        }
        removed
    }

    pub fn round_count(&self) -> usize {
        self.rounds.read().len()
    }

    pub fn current_round(&self) -> RoundNumber {
        self.current_round.load(Ordering::Acquire)
    }

    /// Move the current round forward. Magic blocks whose starting round is
    /// crossed are announced as activated.
    pub fn set_current_round(&self, round: RoundNumber) {
        let _membership = self.membership_lock.lock();
        let previous = self.current_round.fetch_max(round, Ordering::AcqRel);
        if round <= previous {
            return;
        }
        let activated = self.magic_blocks.read().activated_between(previous, round);
        for mb in activated {
            info!(
                number = mb.magic_block_number,
                starting_round = mb.starting_round,
                "Magic block activated"
            );
            self.emit(ChainEvent::MagicBlockActivated {
                magic_block_number: mb.magic_block_number,
                starting_round: mb.starting_round,
            });
        }
    }

    /// Install the round's seed. Only the first call for a round succeeds.
    pub fn set_random_seed(&self, round: &Arc<Round>, seed: u64) -> bool {
        let miners = self.miner_count(round.number());
        round.set_random_seed(seed, miners)
    }

    /// Restart a timed-out round with a new seed.
    pub fn retry_round(&self, round: &Arc<Round>, seed: u64) -> bool {
        let miners = self.miner_count(round.number());
        round.retry_with_seed(seed, miners, round.timeout_count())
    }

    /// Generator timeout for a round.
    pub fn on_round_timeout(&self, round: &Arc<Round>) -> bool {
        if !round.on_timeout() {
            return false;
        }
        ChainStats::incr(&self.stats.round_timeouts);
        warn!(
            round = round.number(),
            timeout_count = round.timeout_count(),
            "Round timed out"
        );
        self.emit(ChainEvent::RoundTimedOut {
            round: round.number(),
            timeout_count: round.timeout_count(),
        });
        true
    }

    /// Store a block and record it as proposed in its round; a block that
    /// arrives with a proof is also notarized.
    pub fn add_round_block(&self, round: &Arc<Round>, block: Block) -> ChainResult<Arc<Block>> {
        if block.round != round.number() {
            return Err(ChainError::invalid_block(
                &block.hash,
                format!("block of round {} added to round {}", block.round, round.number()),
            ));
        }
        // Seed checks precede storage: storing a notarized block can finalize it.
        let block = if block.notarization.is_some() {
            self.add_notarized_block_to_round(round, &Arc::new(block))?
        } else {
            self.add_block(block)?
        };
        round.add_proposed_block(block.clone(), self.block_rank(round, &block));
        Ok(block)
    }

    /// Add a block with a valid proof to the round's notarized set and try to
    /// extend the finalized chain.
    ///
    /// An unseeded round adopts the block's seed. A block with another seed
    /// is only taken when it comes from a later timeout of the round.
    pub fn add_notarized_block_to_round(&self, round: &Arc<Round>, block: &Arc<Block>) -> ChainResult<Arc<Block>> {
        if block.round != round.number() {
            return Err(ChainError::invalid_block(&block.hash, "round mismatch"));
        }
        if !self.blocks.read().is_notarized(&block.hash) {
            if let Err(err) = self.verify_notarization(block) {
                ChainStats::incr(&self.stats.invalid_blocks);
                return Err(err);
            }
        }

        let miners = self.miner_count(round.number());
        match round.random_seed() {
            None => {
                round.set_random_seed(block.round_random_seed, miners);
            }
            Some(seed) if seed != block.round_random_seed => {
                if block.round_timeout_count <= round.timeout_count()
                    || !round.retry_with_seed(block.round_random_seed, miners, block.round_timeout_count)
                {
                    return Err(ChainError::invalid_block(
                        &block.hash,
                        format!(
                            "seed {} does not match round seed {} at timeout count {}",
                            block.round_random_seed,
                            seed,
                            round.timeout_count()
                        ),
                    ));
                }
                info!(
                    round = round.number(),
                    timeout_count = block.round_timeout_count,
                    "Round seed replaced by notarized block from a later timeout"
                );
            }
            Some(_) => {}
        }

        let stored = self.add_block((**block).clone())?;
        self.blocks.write().mark_notarized(stored.hash);
        if round.add_notarized_block(stored.clone(), self.block_rank(round, &stored)) {
            ChainStats::incr(&self.stats.notarized_blocks);
            debug!(round = round.number(), hash = %short_hex(&stored.hash), "Block notarized");
        }

        let outcome = self.try_finalize();
        if let super::FinalizationStop::Halted(err) = &outcome.stop {
            warn!(round = round.number(), error = %err, "Finalization halted");
        }
        Ok(stored)
    }

    /// Generator rank of the block's miner in the round.
    pub(crate) fn block_rank(&self, round: &Round, block: &Block) -> u32 {
        self.get_magic_block(round.number())
            .ok()
            .and_then(|mb| mb.miners.get_node(&block.miner_id).map(|m| m.set_index))
            .and_then(|index| round.miner_rank(index))
            .unwrap_or(UNRANKED)
    }

    fn miner_count(&self, round: RoundNumber) -> usize {
        self.get_magic_block(round).map(|mb| mb.miners.size()).unwrap_or(0)
    }

    /// Trim each storage to `get_target_count(storage)` rounds. A target of
    /// zero disables trimming for that storage.
    pub fn prune_round_storage(
        &self,
        ctx: &Context,
        get_target_count: impl Fn(&dyn RoundStorage) -> usize,
        storages: &[Arc<dyn RoundStorage>],
    ) -> ChainResult<()> {
        for storage in storages {
            if let Some(err) = ctx.err() {
                return Err(err.into());
            }
            let target = get_target_count(storage.as_ref());
            if target == 0 {
                debug!(storage = storage.name(), "Round storage pruning disabled");
                continue;
            }
            let rounds = storage.rounds();
            if rounds.len() <= target {
                continue;
            }
            let below = rounds[rounds.len() - target - 1];
            match storage.prune_below(below) {
                Ok(()) => debug!(storage = storage.name(), below, "Round storage pruned"),
                Err(err) => warn!(storage = storage.name(), below, error = %err, "Round storage prune failed"),
            }
        }
        Ok(())
    }
}
