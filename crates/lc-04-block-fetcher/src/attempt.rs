//! One phase of a fetch: walk a peer list until a valid block turns up.

use crate::domain::{FetchError, FetchRequest, FetchResult};
use crate::ports::{BlockSource, FetchCompletionHandler, FetchTargets};
use shared_types::{short_hex, Block, Context, Hash, Node};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time;
use tracing::{debug, warn};

/// Which kind of peer a phase talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Miners,
    Sharders,
}

/// Reported back to the worker when a phase ends.
#[derive(Debug)]
pub struct AttemptOutcome {
    pub hash: Hash,
    pub phase: Phase,
    /// Peers contacted in this phase.
    pub attempts: u32,
    pub result: FetchResult<Arc<Block>>,
}

/// Everything a phase needs, detached from the worker.
pub struct Attempt {
    pub request: FetchRequest,
    pub phase: Phase,
    pub budget: u32,
    pub timeout: Duration,
    pub source: Arc<dyn BlockSource>,
    pub targets: Arc<dyn FetchTargets>,
    pub handler: Arc<dyn FetchCompletionHandler>,
}

impl Attempt {
    pub async fn run(self, ctx: Context, limit: Arc<Semaphore>) -> AttemptOutcome {
        let hash = self.request.hash;
        let phase = self.phase;

        let permit = tokio::select! {
            permit = limit.acquire_owned() => permit,
            _ = ctx.cancelled() => return self.outcome(0, Err(FetchError::Cancelled)),
        };
        let Ok(permit) = permit else {
            return self.outcome(0, Err(FetchError::Cancelled));
        };

        let mut attempts = 0;
        let mut last_error = FetchError::NotFound(short_hex(&hash));
        let mut found = None;

        for peer in self.peers().iter().take(self.budget as usize) {
            attempts += 1;
            let call = self.call(&ctx, peer);
            let reply = tokio::select! {
                reply = time::timeout(self.timeout, call) => reply,
                _ = ctx.cancelled() => return self.outcome(attempts, Err(FetchError::Cancelled)),
            };

            match reply {
                Ok(Ok(block)) => match check_block(&block, &hash) {
                    Ok(()) => {
                        found = Some(block);
                        break;
                    }
                    Err(e) => {
                        warn!(peer = %peer.id, hash = %short_hex(&hash), error = %e, "Peer returned a bad block");
                        last_error = e;
                    }
                },
                Ok(Err(e)) => {
                    debug!(peer = %peer.id, hash = %short_hex(&hash), error = %e, ?phase, "Peer fetch failed");
                    last_error = e;
                }
                Err(_) => {
                    debug!(peer = %peer.id, hash = %short_hex(&hash), ?phase, "Peer fetch timed out");
                    last_error = FetchError::Source(format!("peer {} timed out", peer.id));
                }
            }
        }
        drop(permit);

        let result = match found {
            Some(block) => {
                self.handler
                    .on_block_fetched(block, phase == Phase::Sharders)
                    .await
            }
            None => Err(last_error),
        };
        self.outcome(attempts, result)
    }

    fn peers(&self) -> Vec<Arc<Node>> {
        match self.phase {
            Phase::Miners => self.targets.miners(self.request.round),
            Phase::Sharders => {
                let mut ranked = self
                    .targets
                    .sharders_ranked(self.request.round, &self.request.hash);
                if let Some(hint) = self.request.sharder_hint {
                    if let Some(pos) = ranked.iter().position(|s| s.id == hint) {
                        let first = ranked.remove(pos);
                        ranked.insert(0, first);
                    }
                }
                ranked
            }
        }
    }

    async fn call(&self, ctx: &Context, peer: &Node) -> FetchResult<Block> {
        let (hash, round) = (&self.request.hash, self.request.round);
        match self.phase {
            Phase::Miners => self.source.fetch_notarized(ctx, peer, hash, round).await,
            Phase::Sharders => self.source.fetch_finalized(ctx, peer, hash, round).await,
        }
    }

    fn outcome(&self, attempts: u32, result: FetchResult<Arc<Block>>) -> AttemptOutcome {
        AttemptOutcome {
            hash: self.request.hash,
            phase: self.phase,
            attempts,
            result,
        }
    }
}

fn check_block(block: &Block, expected: &Hash) -> FetchResult<()> {
    if &block.hash != expected {
        return Err(FetchError::Invalid(format!(
            "asked for {}, got {}",
            short_hex(expected),
            short_hex(&block.hash)
        )));
    }
    block
        .ensure_hash()
        .map_err(|e| FetchError::Invalid(e.to_string()))
}
