//! Block insertion, lookup and notarization checks.

use super::{block_not_found, Chain};
use crate::domain::ChainStats;
use crate::error::{ChainError, ChainResult};
use lc_04_block_fetcher::{FetchError, FetchRequest};
use shared_bus::ChainEvent;
use shared_types::{short_hex, Block, Context, Hash, RoundNumber, Transaction};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

impl Chain {
    /// Idempotent insert. A new block whose predecessor is missing is
    /// flagged and the predecessor is requested from the fetcher.
    pub fn add_block(&self, block: Block) -> ChainResult<Arc<Block>> {
        self.insert_block(block, true)
    }

    /// Insert without resolving the predecessor. Finalization will not pass
    /// the block until its predecessor is stored.
    pub fn add_block_no_previous(&self, block: Block) -> ChainResult<Arc<Block>> {
        self.insert_block(block, false)
    }

    fn insert_block(&self, block: Block, fetch_previous: bool) -> ChainResult<Arc<Block>> {
        if !block.verify_hash() {
            ChainStats::incr(&self.stats.invalid_blocks);
            return Err(ChainError::invalid_block(&block.hash, "hash mismatch"));
        }

        let floor = self.retention_floor();
        if block.round < floor && !self.blocks.read().contains(&block.hash) {
            return Err(ChainError::Stale {
                round: block.round,
                floor,
            });
        }

        let (round, prev) = (block.round, block.prev_hash);
        let inserted = self.blocks.write().insert(block);
        if !inserted.is_new {
            ChainStats::incr(&self.stats.duplicate_blocks);
            if inserted.proof_upgraded {
                debug!(round, hash = %short_hex(&inserted.block.hash), "Stored block gained a proof");
                self.try_finalize();
            }
            return Ok(inserted.block);
        }
        ChainStats::incr(&self.stats.blocks_added);
        debug!(
            round,
            hash = %short_hex(&inserted.block.hash),
            no_previous = inserted.missing_previous,
            "Block added"
        );

        if inserted.missing_previous && fetch_previous {
            if let Some(prev) = prev {
                self.request_fetch(prev, round.saturating_sub(1));
            }
        }

        if !inserted.missing_previous || !inserted.released.is_empty() {
            let outcome = self.try_finalize();
            if !outcome.promoted.is_empty() {
                debug!(lfb_round = outcome.lfb_round, "Finalization advanced after insert");
            }
        }
        Ok(inserted.block)
    }

    /// Local lookup. A miss schedules a fetch and reports `NotFound`; use
    /// [`Chain::fetch_block`] to wait for it.
    pub fn get_block(&self, ctx: &Context, hash: &Hash) -> ChainResult<Arc<Block>> {
        if let Some(err) = ctx.err() {
            return Err(err.into());
        }
        if let Some(block) = self.blocks.read().get(hash) {
            return Ok(block);
        }
        self.request_fetch(*hash, 0);
        Err(block_not_found(hash))
    }

    /// Local lookup, falling back to the fetcher.
    pub async fn fetch_block(&self, ctx: &Context, hash: Hash, round: RoundNumber) -> ChainResult<Arc<Block>> {
        if let Some(block) = self.blocks.read().get(&hash) {
            return Ok(block);
        }
        let fetcher = self.fetcher().ok_or_else(|| block_not_found(&hash))?;
        ChainStats::incr(&self.stats.fetch_requests);
        Ok(fetcher.fetch(ctx, FetchRequest::notarized(hash, round)).await?)
    }

    /// Integrate a block delivered by the fetcher. A block with a valid
    /// proof joins its round's notarized set, which may finalize it.
    pub async fn on_block_fetched(&self, block: Block, from_sharders: bool) -> ChainResult<Arc<Block>> {
        let stored = self.add_block(block)?;
        self.emit(ChainEvent::BlockFetched {
            hash: stored.hash,
            round: stored.round,
        });
        debug!(
            round = stored.round,
            hash = %short_hex(&stored.hash),
            from_sharders,
            "Fetched block integrated"
        );

        let ctx = Context::background();
        if stored.round > 0 && self.is_block_notarized(&stored) {
            let round = self.get_or_create_round(stored.round);
            self.add_notarized_block_to_round(&round, &stored)?;
            if !from_sharders {
                let handler = self.hooks.read().fetched_notarized.clone();
                if let Some(handler) = handler {
                    handler.notarized_block_fetched(&ctx, &stored).await?;
                }
            }
        }

        let after_fetcher = self.hooks.read().after_fetcher.clone();
        if let Some(after_fetcher) = after_fetcher {
            after_fetcher.after_fetch(&ctx, &stored).await?;
        }
        Ok(stored)
    }

    /// Fire-and-forget fetch request.
    pub(crate) fn request_fetch(&self, hash: Hash, round: RoundNumber) {
        let Some(fetcher) = self.fetcher() else {
            return;
        };
        ChainStats::incr(&self.stats.fetch_requests);
        match fetcher.request(FetchRequest::notarized(hash, round)) {
            Ok(()) => debug!(round, hash = %short_hex(&hash), "Fetch requested"),
            Err(FetchError::Backpressure) => {
                debug!(round, hash = %short_hex(&hash), "Fetcher busy, request dropped")
            }
            Err(err) => warn!(round, hash = %short_hex(&hash), error = %err, "Fetch request failed"),
        }
    }

    pub fn block_count(&self) -> usize {
        self.blocks.read().len()
    }

    pub fn has_block(&self, hash: &Hash) -> bool {
        self.blocks.read().contains(hash)
    }

    pub fn round_blocks(&self, round: RoundNumber) -> Vec<Arc<Block>> {
        self.blocks.read().round_blocks(round)
    }

    pub fn is_no_previous(&self, hash: &Hash) -> bool {
        self.blocks.read().is_no_previous(hash)
    }

    pub fn delete_block(&self, hash: &Hash) -> Option<Arc<Block>> {
        self.blocks.write().remove(hash)
    }

    /// Check a block's proof: distinct verifiers that are miners of the
    /// covering magic block, each signature valid over the block hash, at
    /// least the notarization threshold of them.
    pub fn verify_notarization(&self, block: &Block) -> ChainResult<()> {
        let proof = block
            .notarization
            .as_ref()
            .ok_or_else(|| ChainError::invalid_notarization(&block.hash, "no proof"))?;
        let mb = self.get_magic_block(block.round)?;

        let mut verifiers = HashSet::new();
        for ticket in &proof.tickets {
            let miner = mb.miners.get_node(&ticket.verifier_id).ok_or_else(|| {
                ChainError::invalid_notarization(
                    &block.hash,
                    format!("verifier {} is not a miner", ticket.verifier_id),
                )
            })?;
            self.scheme
                .verify(&miner.public_key, &block.hash, &ticket.signature)
                .map_err(|e| ChainError::invalid_notarization(&block.hash, e.to_string()))?;
            verifiers.insert(ticket.verifier_id);
        }

        let threshold = self.get_notarization_threshold_count(mb.miners.size());
        if verifiers.len() < threshold {
            return Err(ChainError::invalid_notarization(
                &block.hash,
                format!("{} of {} required signatures", verifiers.len(), threshold),
            ));
        }
        Ok(())
    }

    /// Whether the block carries a valid proof. Verified proofs are cached
    /// per stored block.
    pub fn is_block_notarized(&self, block: &Block) -> bool {
        if self.blocks.read().is_notarized(&block.hash) {
            return true;
        }
        if block.notarization.is_none() {
            return false;
        }
        match self.verify_notarization(block) {
            Ok(()) => {
                self.blocks.write().mark_notarized(block.hash);
                true
            }
            Err(err) => {
                debug!(hash = %short_hex(&block.hash), error = %err, "Notarization rejected");
                false
            }
        }
    }

    /// Walk from `block` towards the LDB looking for `txn`.
    ///
    /// Ends with `false` at the first ancestor created more than the time
    /// tolerance before the transaction. Reaching genesis or the LDB without
    /// a verdict is `NotFound`; so is a missing ancestor, which is fetched.
    pub fn chain_has_transaction(&self, ctx: &Context, block: &Block, txn: &Transaction) -> ChainResult<bool> {
        let boundary = self.latest_deterministic_block().map(|b| b.round).unwrap_or(0);
        let mut current: Option<Arc<Block>> = None;
        loop {
            if let Some(err) = ctx.err() {
                return Err(err.into());
            }
            let b: &Block = current.as_deref().unwrap_or(block);
            if b.contains_transaction(&txn.hash) {
                return Ok(true);
            }
            if b.creation_date.saturating_add(self.config.txn_time_tolerance) < txn.creation_date {
                return Ok(false);
            }
            if b.is_genesis() || b.round <= boundary {
                return Err(ChainError::InsufficientChain(b.round));
            }
            let Some(prev) = b.prev_hash else {
                return Err(ChainError::InsufficientChain(b.round));
            };
            let round = b.round;
            let next = self.blocks.read().get(&prev);
            match next {
                Some(parent) => current = Some(parent),
                None => {
                    self.request_fetch(prev, round.saturating_sub(1));
                    return Err(block_not_found(&prev));
                }
            }
        }
    }
}
