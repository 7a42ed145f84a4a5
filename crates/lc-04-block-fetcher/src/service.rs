//! # Fetcher Worker
//!
//! Owns the in-flight map. Attempts run as spawned tasks and report back
//! over an internal channel, so the worker never awaits a peer.

use crate::attempt::{Attempt, AttemptOutcome, Phase};
use crate::domain::{FetchError, FetchQueueStats, FetchRequest, FetchResult, FetcherConfig};
use crate::ports::{BlockSource, FetchCompletionHandler, FetchTargets};
use lc_03_lfb_ticket::LfbTicket;
use shared_types::{short_hex, Block, CancelHandle, Context, Hash, RoundNumber};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Reply = oneshot::Sender<FetchResult<Arc<Block>>>;

enum Command {
    Fetch {
        request: FetchRequest,
        reply: Option<Reply>,
    },
    Stats(oneshot::Sender<FetchQueueStats>),
}

struct InFlight {
    request: FetchRequest,
    waiters: Vec<Reply>,
    attempts: u32,
    phase: Phase,
}

/// The fetcher worker.
pub struct BlockFetcher {
    config: FetcherConfig,
    source: Arc<dyn BlockSource>,
    targets: Arc<dyn FetchTargets>,
    handler: Arc<dyn FetchCompletionHandler>,
    commands: mpsc::Receiver<Command>,
    outcomes_tx: mpsc::UnboundedSender<AttemptOutcome>,
    outcomes: mpsc::UnboundedReceiver<AttemptOutcome>,
    tickets: Option<mpsc::Receiver<LfbTicket>>,
    in_flight: HashMap<Hash, InFlight>,
    miners_limit: Arc<Semaphore>,
    sharders_limit: Arc<Semaphore>,
    lfb_ticket_round: RoundNumber,
    completed: u64,
    failed: u64,
    ctx: Context,
    cancel: CancelHandle,
    shutdown: watch::Receiver<bool>,
    done: watch::Sender<bool>,
}

impl BlockFetcher {
    /// Start the worker. `tickets` is a subscription to the LFB ticket
    /// worker; without it every fetch starts with miners.
    pub fn spawn(
        config: FetcherConfig,
        source: Arc<dyn BlockSource>,
        targets: Arc<dyn FetchTargets>,
        handler: Arc<dyn FetchCompletionHandler>,
        tickets: Option<mpsc::Receiver<LfbTicket>>,
    ) -> (BlockFetcherHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity().max(1));
        let (outcomes_tx, outcomes) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);
        let (ctx, cancel) = Context::with_cancel();

        let fetcher = Self {
            miners_limit: Arc::new(Semaphore::new(config.max_from_miners.max(1))),
            sharders_limit: Arc::new(Semaphore::new(config.max_from_sharders.max(1))),
            in_flight: HashMap::with_capacity(config.max_in_flight),
            config,
            source,
            targets,
            handler,
            commands: command_rx,
            outcomes_tx,
            outcomes,
            tickets,
            lfb_ticket_round: 0,
            completed: 0,
            failed: 0,
            ctx,
            cancel,
            shutdown: shutdown_rx,
            done: done_tx,
        };

        let handle = BlockFetcherHandle {
            commands: command_tx,
            shutdown: Arc::new(shutdown_tx),
            done: done_rx,
        };
        (handle, tokio::spawn(fetcher.run()))
    }

    async fn run(mut self) {
        info!(
            from_miners = self.config.max_from_miners,
            from_sharders = self.config.max_from_sharders,
            "Block fetcher started"
        );

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                Some(outcome) = self.outcomes.recv() => self.on_outcome(outcome),
                ticket = next_ticket(&mut self.tickets), if self.tickets.is_some() => match ticket {
                    Some(ticket) => {
                        if ticket.round > self.lfb_ticket_round {
                            self.lfb_ticket_round = ticket.round;
                        }
                    }
                    None => self.tickets = None,
                },
                command = self.commands.recv() => match command {
                    Some(Command::Fetch { request, reply }) => self.on_fetch(request, reply),
                    Some(Command::Stats(reply)) => {
                        let _ = reply.send(self.stats());
                    }
                    None => break,
                },
            }
        }

        self.cancel.cancel();
        self.miners_limit.close();
        self.sharders_limit.close();
        let pending = self.in_flight.len();
        for (_, entry) in self.in_flight.drain() {
            respond(entry.waiters, Err(FetchError::Cancelled));
        }
        self.done.send_replace(true);
        info!(pending, "Block fetcher stopped");
    }

    fn on_fetch(&mut self, request: FetchRequest, reply: Option<Reply>) {
        if let Some(entry) = self.in_flight.get_mut(&request.hash) {
            entry.waiters.extend(reply);
            // A finalized-block request carries a better first sharder.
            if entry.request.sharder_hint.is_none() {
                entry.request.sharder_hint = request.sharder_hint;
            }
            return;
        }

        if self.in_flight.len() >= self.config.max_in_flight {
            debug!(hash = %short_hex(&request.hash), "Fetch rejected, too many in flight");
            respond(reply.into_iter().collect(), Err(FetchError::Backpressure));
            return;
        }

        let phase = if request.sharders_only
            || (request.round > 0 && request.round <= self.lfb_ticket_round)
        {
            Phase::Sharders
        } else {
            Phase::Miners
        };
        debug!(hash = %short_hex(&request.hash), round = request.round, ?phase, "Fetching block");

        let hash = request.hash;
        self.in_flight.insert(
            hash,
            InFlight {
                request,
                waiters: reply.into_iter().collect(),
                attempts: 0,
                phase,
            },
        );
        self.start_attempt(&hash);
    }

    fn on_outcome(&mut self, outcome: AttemptOutcome) {
        let Some(mut entry) = self.in_flight.remove(&outcome.hash) else {
            warn!(hash = %short_hex(&outcome.hash), "Outcome for a hash not in flight");
            return;
        };
        entry.attempts += outcome.attempts;

        let error = match outcome.result {
            Ok(block) => {
                self.completed += 1;
                debug!(hash = %short_hex(&block.hash), round = block.round, attempts = entry.attempts, "Block fetched");
                respond(entry.waiters, Ok(block));
                return;
            }
            Err(e) => e,
        };

        // Blocks above the latest ticket are not on sharders yet.
        let sharders_cannot_help =
            entry.request.round > 0 && entry.request.round > self.lfb_ticket_round;
        if outcome.phase == Phase::Sharders
            || !error.is_retryable()
            || entry.attempts >= self.config.max_attempts
            || sharders_cannot_help
        {
            self.failed += 1;
            debug!(
                hash = %short_hex(&outcome.hash),
                round = entry.request.round,
                attempts = entry.attempts,
                error = %error,
                "Block fetch failed"
            );
            respond(entry.waiters, Err(error));
            return;
        }

        entry.phase = Phase::Sharders;
        let hash = outcome.hash;
        self.in_flight.insert(hash, entry);
        self.start_attempt(&hash);
    }

    fn start_attempt(&self, hash: &Hash) {
        let Some(entry) = self.in_flight.get(hash) else {
            return;
        };
        let attempt = Attempt {
            request: entry.request.clone(),
            phase: entry.phase,
            budget: self.config.max_attempts.saturating_sub(entry.attempts),
            timeout: self.config.request_timeout,
            source: self.source.clone(),
            targets: self.targets.clone(),
            handler: self.handler.clone(),
        };
        let limit = match entry.phase {
            Phase::Miners => self.miners_limit.clone(),
            Phase::Sharders => self.sharders_limit.clone(),
        };
        let ctx = self.ctx.clone();
        let outcomes = self.outcomes_tx.clone();
        tokio::spawn(async move {
            let outcome = attempt.run(ctx, limit).await;
            let _ = outcomes.send(outcome);
        });
    }

    fn stats(&self) -> FetchQueueStats {
        FetchQueueStats {
            miners: self.config.max_from_miners.saturating_sub(self.miners_limit.available_permits()),
            sharders: self
                .config
                .max_from_sharders
                .saturating_sub(self.sharders_limit.available_permits()),
            in_flight: self.in_flight.len(),
            lfb_ticket_round: self.lfb_ticket_round,
            completed: self.completed,
            failed: self.failed,
        }
    }
}

async fn next_ticket(tickets: &mut Option<mpsc::Receiver<LfbTicket>>) -> Option<LfbTicket> {
    match tickets {
        Some(rx) => rx.recv().await,
        None => None,
    }
}

fn respond(waiters: Vec<Reply>, result: FetchResult<Arc<Block>>) {
    for waiter in waiters {
        let _ = waiter.send(result.clone());
    }
}

/// Cloneable front end of the fetcher.
#[derive(Clone)]
pub struct BlockFetcherHandle {
    commands: mpsc::Sender<Command>,
    shutdown: Arc<watch::Sender<bool>>,
    done: watch::Receiver<bool>,
}

impl BlockFetcherHandle {
    /// Queue a fetch without waiting for it. The block reaches the
    /// coordinator through the completion handler.
    pub fn request(&self, request: FetchRequest) -> FetchResult<()> {
        self.commands
            .try_send(Command::Fetch {
                request,
                reply: None,
            })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => FetchError::Backpressure,
                mpsc::error::TrySendError::Closed(_) => FetchError::Closed,
            })
    }

    /// Fetch and wait for the integrated block.
    pub async fn fetch(&self, ctx: &Context, request: FetchRequest) -> FetchResult<Arc<Block>> {
        if ctx.is_done() {
            return Err(FetchError::Cancelled);
        }
        let (reply, rx) = oneshot::channel();
        let command = Command::Fetch {
            request,
            reply: Some(reply),
        };
        tokio::select! {
            sent = self.commands.send(command) => sent.map_err(|_| FetchError::Closed)?,
            _ = ctx.cancelled() => return Err(FetchError::Cancelled),
        }
        tokio::select! {
            result = rx => result.unwrap_or(Err(FetchError::Closed)),
            _ = ctx.cancelled() => Err(FetchError::Cancelled),
        }
    }

    /// Current load.
    pub async fn stats(&self, ctx: &Context) -> FetchResult<FetchQueueStats> {
        let (reply, rx) = oneshot::channel();
        tokio::select! {
            sent = self.commands.send(Command::Stats(reply)) => sent.map_err(|_| FetchError::Closed)?,
            _ = ctx.cancelled() => return Err(FetchError::Cancelled),
        }
        tokio::select! {
            stats = rx => stats.map_err(|_| FetchError::Closed),
            _ = ctx.cancelled() => Err(FetchError::Cancelled),
        }
    }

    /// Stop the worker; every waiter receives `Cancelled`.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.done.borrow()
    }

    /// Resolves once the worker has exited.
    pub async fn stopped(&self) {
        let mut done = self.done.clone();
        while !*done.borrow_and_update() {
            if done.changed().await.is_err() {
                return;
            }
        }
    }
}
