//! # Round Pipeline
//!
//! Single task driving rounds forward: it opens round `LFB + 1` as soon as
//! a block is finalized, seeds it, and times it out when no block gets
//! notarized within the generation timeout.
//!
//! ```text
//!   BlockFinalized(r) ──► open(r + 1) ──► seeded ──► Submit(block) ──► notarized
//!                               │                                        │
//!                       generate_timeout                          try_finalize
//!                               ▼                                        │
//!                         on_round_timeout                               ▼
//!                               │                              BlockFinalized(r + 1)
//!                        retry_wait_time
//!                               ▼
//!                    retry_round(new seed)
//! ```
//!
//! Submitted blocks go through [`Chain::add_round_block`], so proposals and
//! notarizations share one ordered path with the timers.

use crate::domain::{Round, RoundPhase};
use crate::error::{ChainError, ChainResult};
use crate::ports::SeedSource;
use crate::service::Chain;
use shared_bus::{ChainEvent, EventFilter, EventTopic, Subscription};
use shared_types::{short_hex, Block, Context, RoundNumber};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::{debug, info, warn};

const COMMAND_CAPACITY: usize = 256;

/// Where the pipeline is in the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStatus {
    pub round: RoundNumber,
    pub phase: RoundPhase,
    pub timeout_count: u32,
    pub lfb_round: RoundNumber,
}

enum Command {
    Submit {
        block: Block,
        reply: oneshot::Sender<ChainResult<Arc<Block>>>,
    },
    Status(oneshot::Sender<Option<PipelineStatus>>),
}

/// What the next deadline means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Timer {
    Generate,
    Retry,
}

/// The round worker.
pub struct RoundPipeline {
    chain: Arc<Chain>,
    seeds: Arc<dyn SeedSource>,
    events: Subscription,
    current: Option<Arc<Round>>,
    deadline: Instant,
    timer: Timer,
    commands: mpsc::Receiver<Command>,
    shutdown: watch::Receiver<bool>,
    done: watch::Sender<bool>,
}

impl RoundPipeline {
    /// Start the worker. If genesis is not set yet, the first round opens
    /// once `GenesisInitialized` is seen.
    pub fn spawn(chain: Arc<Chain>, seeds: Arc<dyn SeedSource>) -> (RoundPipelineHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);

        // Subscribe before reading the LFB so no finalization is missed.
        let events = chain.bus().subscribe(EventFilter::topics(vec![EventTopic::Blocks]));
        let handle = RoundPipelineHandle {
            commands: command_tx,
            shutdown: Arc::new(shutdown_tx),
            done: done_rx,
        };
        let pipeline = Self {
            chain,
            seeds,
            events,
            current: None,
            deadline: Instant::now(),
            timer: Timer::Generate,
            commands: command_rx,
            shutdown: shutdown_rx,
            done: done_tx,
        };
        let task = tokio::spawn(pipeline.run());
        (handle, task)
    }

    async fn run(mut self) {
        self.advance();
        info!(round = self.current_number(), "Round pipeline started");

        loop {
            let deadline = self.deadline;
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                event = self.events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => break,
                },
                _ = time::sleep_until(deadline), if self.current.is_some() => self.on_deadline(),
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
            }
        }

        self.done.send_replace(true);
        info!(round = self.current_number(), "Round pipeline stopped");
    }

    fn current_number(&self) -> RoundNumber {
        self.current.as_ref().map_or(0, |round| round.number())
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Submit { block, reply } => {
                let result = self.submit(block);
                let _ = reply.send(result);
            }
            Command::Status(reply) => {
                let status = self.current.as_ref().map(|round| PipelineStatus {
                    round: round.number(),
                    phase: round.phase(),
                    timeout_count: round.timeout_count(),
                    lfb_round: self.chain.latest_finalized_block().map_or(0, |b| b.round),
                });
                let _ = reply.send(status);
            }
        }
    }

    fn submit(&mut self, block: Block) -> ChainResult<Arc<Block>> {
        let round = self.chain.get_or_create_round(block.round);
        let block = self.chain.add_round_block(&round, block)?;
        // A notarized submission may have finalized the open round.
        self.advance();
        Ok(block)
    }

    fn on_event(&mut self, event: ChainEvent) {
        match event {
            ChainEvent::BlockFinalized { round, block_hash } => {
                debug!(round, hash = %short_hex(&block_hash), "Pipeline saw finalized block");
                self.advance();
            }
            ChainEvent::GenesisInitialized { .. } => self.advance(),
            _ => {}
        }
    }

    /// Open `LFB + 1` if it is ahead of the round being driven.
    fn advance(&mut self) {
        let Some(lfb) = self.chain.latest_finalized_block() else {
            return;
        };
        let next = lfb.round + 1;
        if self.current.is_some() && next <= self.current_number() {
            return;
        }

        let round = self.chain.get_or_create_round(next);
        let seed = self.seeds.round_seed(next, &lfb.hash, round.timeout_count());
        if !self.chain.set_random_seed(&round, seed) {
            debug!(round = next, "Round already seeded");
        }
        self.chain.set_current_round(next);
        self.current = Some(round);
        self.arm(Timer::Generate);
        debug!(round = next, seed, "Round opened");
    }

    fn arm(&mut self, timer: Timer) {
        let wait = match timer {
            Timer::Generate => self.chain.generate_timeout(),
            Timer::Retry => self.chain.retry_wait_time(),
        };
        self.timer = timer;
        self.deadline = Instant::now() + wait;
    }

    fn on_deadline(&mut self) {
        let Some(round) = self.current.clone() else {
            return;
        };
        match (self.timer, round.phase()) {
            (_, RoundPhase::Finalized) => self.advance(),
            // Notarized but its predecessor is not final yet; keep waiting.
            (_, RoundPhase::Notarized) => self.arm(Timer::Generate),
            (Timer::Generate, _) => {
                self.chain.on_round_timeout(&round);
                self.arm(Timer::Retry);
            }
            (Timer::Retry, _) => {
                let lfb_hash = self.chain.latest_finalized_block().map(|b| b.hash).unwrap_or_default();
                let seed = self.seeds.round_seed(round.number(), &lfb_hash, round.timeout_count());
                if self.chain.retry_round(&round, seed) {
                    info!(
                        round = round.number(),
                        timeout_count = round.timeout_count(),
                        "Round restarted"
                    );
                } else {
                    warn!(round = round.number(), "Round restart rejected");
                }
                self.arm(Timer::Generate);
            }
        }
    }
}

/// Cloneable front end of the round pipeline.
#[derive(Clone)]
pub struct RoundPipelineHandle {
    commands: mpsc::Sender<Command>,
    shutdown: Arc<watch::Sender<bool>>,
    done: watch::Receiver<bool>,
}

impl RoundPipelineHandle {
    async fn send(&self, ctx: &Context, command: Command) -> ChainResult<()> {
        if let Some(e) = ctx.err() {
            return Err(e.into());
        }
        tokio::select! {
            sent = self.commands.send(command) => sent.map_err(|_| stopped()),
            e = ctx.cancelled() => Err(e.into()),
        }
    }

    /// Hand a proposed or notarized block to the pipeline.
    pub async fn submit(&self, ctx: &Context, block: Block) -> ChainResult<Arc<Block>> {
        let (reply, response) = oneshot::channel();
        self.send(ctx, Command::Submit { block, reply }).await?;
        tokio::select! {
            result = response => result.map_err(|_| stopped())?,
            e = ctx.cancelled() => Err(e.into()),
        }
    }

    /// Non-blocking [`submit`](Self::submit); the outcome is dropped.
    pub fn try_submit(&self, block: Block) -> ChainResult<()> {
        let (reply, _) = oneshot::channel();
        self.commands
            .try_send(Command::Submit { block, reply })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => ChainError::Backpressure("round pipeline"),
                mpsc::error::TrySendError::Closed(_) => stopped(),
            })
    }

    /// `None` until genesis is set.
    pub async fn status(&self, ctx: &Context) -> ChainResult<Option<PipelineStatus>> {
        let (reply, response) = oneshot::channel();
        self.send(ctx, Command::Status(reply)).await?;
        response.await.map_err(|_| stopped())
    }

    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.done.borrow()
    }

    /// Wait for the worker to exit.
    pub async fn stopped(&self) {
        let mut done = self.done.clone();
        let _ = done.wait_for(|stopped| *stopped).await;
    }
}

fn stopped() -> ChainError {
    ChainError::Cancelled("round pipeline stopped".into())
}
