//! # Finalization
//!
//! Extends the finalized chain one round at a time from the LFB. A round's
//! candidates are its notarized blocks plus stored blocks of that round with
//! a valid proof; only those whose predecessor is the LFB, that carry the
//! round's seed once it has one, and that are not waiting on a missing
//! predecessor qualify. The lowest generator rank wins,
//! ties broken by hash.
//!
//! Queue permits are reserved before a block is promoted, so a full queue
//! stops the pass without moving the LFB.

use super::Chain;
use crate::domain::{best_ranked, ChainStats, RankedBlock, Round};
use crate::error::ChainError;
use shared_bus::ChainEvent;
use shared_types::{short_hex, Block, Hash, RoundNumber};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::{Permit, Sender};
use tracing::{debug, info, warn};

/// Why a finalization pass stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalizationStop {
    /// No qualifying notarized successor of the LFB.
    NoCandidate,
    /// No LFB yet; genesis has not been installed.
    NotReady,
    /// A finalized queue is full.
    Backpressure,
    /// Promoting the winner failed; advancement halts until it is replaced.
    Halted(ChainError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizationOutcome {
    /// Hashes promoted by this pass, in round order.
    pub promoted: Vec<Hash>,
    /// LFB round when the pass stopped.
    pub lfb_round: RoundNumber,
    pub stop: FinalizationStop,
}

impl FinalizationOutcome {
    pub fn advanced(&self) -> bool {
        !self.promoted.is_empty()
    }
}

/// Reserve a queue slot. `Ok(None)` when nobody consumes the queue.
fn reserve<T>(tx: &Sender<T>) -> Result<Option<Permit<'_, T>>, ()> {
    match tx.try_reserve() {
        Ok(permit) => Ok(Some(permit)),
        Err(TrySendError::Full(())) => Err(()),
        Err(TrySendError::Closed(())) => Ok(None),
    }
}

impl Chain {
    /// Promote notarized successors of the LFB until none qualifies.
    pub fn try_finalize(&self) -> FinalizationOutcome {
        let _finalizing = self.finalization_lock.lock();
        let mut outcome = FinalizationOutcome {
            promoted: Vec::new(),
            lfb_round: 0,
            stop: FinalizationStop::NoCandidate,
        };

        loop {
            let Some(lfb) = self.latest_finalized_block() else {
                outcome.stop = FinalizationStop::NotReady;
                break;
            };
            outcome.lfb_round = lfb.round;

            let Some(winner) = self.finalization_candidate(&lfb) else {
                break;
            };

            let Ok(block_permit) = reserve(&self.finalized_blocks_tx) else {
                debug!(round = winner.block.round, "Finalized block queue full");
                outcome.stop = FinalizationStop::Backpressure;
                break;
            };
            let Ok(round_permit) = reserve(&self.finalized_rounds_tx) else {
                debug!(round = winner.block.round, "Finalized round queue full");
                outcome.stop = FinalizationStop::Backpressure;
                break;
            };

            match self.promote(&winner) {
                Ok(round) => {
                    if let Some(permit) = block_permit {
                        permit.send(winner.block.clone());
                    }
                    if let Some(permit) = round_permit {
                        permit.send(round);
                    }
                    outcome.promoted.push(winner.block.hash);
                    outcome.lfb_round = winner.block.round;
                }
                Err(err) => {
                    warn!(
                        round = winner.block.round,
                        hash = %short_hex(&winner.block.hash),
                        error = %err,
                        "Finalization halted"
                    );
                    outcome.stop = FinalizationStop::Halted(err);
                    break;
                }
            }
        }
        outcome
    }

    fn finalization_candidate(&self, lfb: &Arc<Block>) -> Option<RankedBlock> {
        let number = lfb.round + 1;
        let round = self.rounds.read().get(number);
        let mut candidates = round.as_ref().map(|r| r.notarized_blocks()).unwrap_or_default();

        let stored = self.blocks.read().round_blocks(number);
        for block in stored {
            if block.notarization.is_none() || candidates.iter().any(|c| c.block.hash == block.hash) {
                continue;
            }
            if block.prev_hash != Some(lfb.hash) || !self.is_block_notarized(&block) {
                continue;
            }
            let rank = round
                .as_deref()
                .map_or(crate::domain::UNRANKED, |r| self.block_rank(r, &block));
            candidates.push(RankedBlock { block, rank });
        }

        let seed = round.as_ref().and_then(|r| r.random_seed());
        let blocks = self.blocks.read();
        candidates.retain(|c| {
            c.block.prev_hash == Some(lfb.hash)
                && seed.map_or(true, |seed| seed == c.block.round_random_seed)
                && blocks.contains(&c.block.hash)
                && !blocks.is_no_previous(&c.block.hash)
        });
        best_ranked(&candidates).cloned()
    }

    /// Make `winner` the LFB. The view change runs first so a rejected
    /// magic block leaves the LFB where it was.
    fn promote(&self, winner: &RankedBlock) -> Result<Arc<Round>, ChainError> {
        let block = &winner.block;
        if let Some(mb) = &block.magic_block {
            self.apply_view_change(mb)?;
        }

        let round = self.get_or_create_round(block.round);
        if !round.has_random_seed() {
            self.set_random_seed(&round, block.round_random_seed);
        }
        round.add_notarized_block(block.clone(), winner.rank);
        round.finalize(block.hash);

        self.set_lfb(block.clone());
        if self.is_finalized_deterministically(block) {
            self.set_ldb(block.clone());
        }
        if let Ok(mb) = self.get_magic_block(block.round) {
            *self.lfmb.write() = Some(mb);
        }
        {
            let mut fees = self.fee_stats.lock();
            for txn in &block.transactions {
                fees.record(txn.fee);
            }
        }
        *self.state_root.write() = block.state_root;
        ChainStats::incr(&self.stats.finalized_blocks);
        self.latest_own_finalized_round.fetch_max(block.round, Ordering::AcqRel);
        self.set_current_round(block.round);

        info!(
            round = block.round,
            hash = %short_hex(&block.hash),
            rank = winner.rank,
            txns = block.transactions.len(),
            "Block finalized"
        );
        self.emit(ChainEvent::BlockFinalized {
            round: block.round,
            block_hash: block.hash,
        });
        self.emit(ChainEvent::RoundFinalized { round: block.round });

        if let Some(tickets) = self.lfb_tickets() {
            if let Err(err) = tickets.try_broadcast(block.round, block.hash) {
                debug!(round = block.round, error = %err, "LFB ticket not broadcast");
            }
        }
        if let Err(err) = self.persist_finalized(block) {
            warn!(round = block.round, error = %err, "Failed to persist chain snapshot");
        }
        Ok(round)
    }

    /// Enough unique signers for the block to serve as the LDB.
    pub fn is_finalized_deterministically(&self, block: &Block) -> bool {
        let Some(proof) = &block.notarization else {
            return false;
        };
        let Ok(mb) = self.get_magic_block(block.round) else {
            return false;
        };
        proof.unique_verifiers() * 100 >= mb.miners.size() * self.config.deterministic_ratio as usize
    }
}
