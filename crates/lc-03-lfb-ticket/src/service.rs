//! # Ticket Worker
//!
//! Single task owning the latest ticket and the subscriber sinks. Everything
//! else talks to it through [`LfbTicketHandle`].

use crate::domain::{LfbTicket, LfbTicketConfig, LfbTicketError, LfbTicketResult};
use crate::ports::{SharderDirectory, TicketBroadcaster};
use shared_crypto::{SignatureScheme, SigningKeyPair};
use shared_types::{short_hex, Context, Hash, NodeId, RoundNumber};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time;
use tracing::{debug, info, warn};

/// Rounds the local LFB may trail the ticket before the node counts as
/// syncing, independent of `LfbTicketConfig::ahead`.
const SYNC_LAG_ROUNDS: u64 = 3;

/// Result of a subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeOutcome {
    Registered,
    AlreadySubscribed,
    /// The worker has exited; the sink will never receive anything.
    ServiceStopped,
}

enum Command {
    Update(LfbTicket),
    Broadcast {
        round: RoundNumber,
        hash: Hash,
    },
    Subscribe {
        sink: mpsc::Sender<LfbTicket>,
        ack: oneshot::Sender<SubscribeOutcome>,
    },
    Unsubscribe(mpsc::Sender<LfbTicket>),
    Latest(oneshot::Sender<LfbTicket>),
}

/// Checks received tickets against the sharders' registered keys.
pub struct TicketVerifier {
    directory: Arc<dyn SharderDirectory>,
    scheme: Arc<dyn SignatureScheme>,
}

impl TicketVerifier {
    pub fn new(directory: Arc<dyn SharderDirectory>, scheme: Arc<dyn SignatureScheme>) -> Self {
        Self { directory, scheme }
    }

    pub fn verify(&self, ticket: &LfbTicket) -> LfbTicketResult<()> {
        let sharder = self
            .directory
            .sharder(&ticket.sharder_id)
            .ok_or(LfbTicketError::UnknownSharder(ticket.sharder_id))?;
        ticket.verify(self.scheme.as_ref(), &sharder.public_key)
    }
}

/// The ticket worker.
pub struct LfbTicketService {
    config: LfbTicketConfig,
    latest: LfbTicket,
    signer: Option<Arc<dyn SigningKeyPair>>,
    broadcaster: Arc<dyn TicketBroadcaster>,
    sinks: Vec<mpsc::Sender<LfbTicket>>,
    commands: mpsc::Receiver<Command>,
    shutdown: watch::Receiver<bool>,
    done: watch::Sender<bool>,
}

impl LfbTicketService {
    /// Start the worker from the block this node currently treats as its LFB.
    ///
    /// `signer` is set on sharders only; without it the worker neither signs
    /// nor broadcasts.
    pub fn spawn(
        config: LfbTicketConfig,
        lfb_round: RoundNumber,
        lfb_hash: Hash,
        signer: Option<Arc<dyn SigningKeyPair>>,
        broadcaster: Arc<dyn TicketBroadcaster>,
        verifier: TicketVerifier,
    ) -> (LfbTicketHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(config.command_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);

        let latest = initial_ticket(lfb_round, lfb_hash, signer.as_deref());
        let handle = LfbTicketHandle {
            commands: command_tx,
            shutdown: Arc::new(shutdown_tx),
            done: done_rx,
            verifier: Arc::new(verifier),
            ahead: config.ahead,
        };

        let service = Self {
            config,
            latest,
            signer,
            broadcaster,
            sinks: Vec::new(),
            commands: command_rx,
            shutdown: shutdown_rx,
            done: done_tx,
        };
        let task = tokio::spawn(service.run());
        (handle, task)
    }

    async fn run(mut self) {
        info!(
            round = self.latest.round,
            sharder = self.signer.is_some(),
            "LFB ticket worker started"
        );

        loop {
            // Restarted every iteration: only silence triggers a rebroadcast.
            let rebroadcast = time::sleep(self.config.rebroadcast_interval);
            tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle(command),
                    None => break,
                },
                _ = rebroadcast, if self.signer.is_some() => self.rebroadcast(),
            }
        }

        self.sinks.clear();
        self.done.send_replace(true);
        info!(round = self.latest.round, "LFB ticket worker stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Update(ticket) => self.on_update(ticket),
            Command::Broadcast { round, hash } => self.on_broadcast(round, hash),
            Command::Subscribe { sink, ack } => {
                let outcome = if self.sinks.iter().any(|s| s.same_channel(&sink)) {
                    SubscribeOutcome::AlreadySubscribed
                } else {
                    self.sinks.push(sink);
                    SubscribeOutcome::Registered
                };
                let _ = ack.send(outcome);
            }
            Command::Unsubscribe(sink) => self.sinks.retain(|s| !s.same_channel(&sink)),
            Command::Latest(reply) => {
                let _ = reply.send(self.latest.clone());
            }
        }
    }

    fn on_update(&mut self, ticket: LfbTicket) {
        if ticket.round <= self.latest.round {
            debug!(
                round = ticket.round,
                latest = self.latest.round,
                "Ticket not newer than latest"
            );
            return;
        }
        // Received tickets were already broadcast by their issuer.
        self.notify(&ticket);
        self.latest = ticket;
    }

    fn on_broadcast(&mut self, round: RoundNumber, hash: Hash) {
        let Some(signer) = self.signer.as_deref() else {
            return;
        };
        if round <= self.latest.round {
            debug!(round, latest = self.latest.round, "Finalized round not newer than latest ticket");
            return;
        }
        let ticket = match LfbTicket::signed(round, hash, signer) {
            Ok(ticket) => ticket,
            Err(e) => {
                warn!(round, error = %e, "Failed to sign LFB ticket");
                return;
            }
        };

        debug!(round, hash = %short_hex(&hash), "Broadcasting LFB ticket");
        self.send(ticket.clone());
        self.notify(&ticket);
        self.latest = ticket;
    }

    fn rebroadcast(&self) {
        if self.latest.is_signed() {
            debug!(round = self.latest.round, "Rebroadcasting LFB ticket");
            self.send(self.latest.clone());
        }
    }

    fn send(&self, ticket: LfbTicket) {
        let broadcaster = self.broadcaster.clone();
        tokio::spawn(async move { broadcaster.broadcast(&ticket).await });
    }

    fn notify(&mut self, ticket: &LfbTicket) {
        self.sinks.retain(|sink| match sink.try_send(ticket.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(round = ticket.round, "Subscriber lagging, ticket skipped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
    }
}

fn initial_ticket(round: RoundNumber, hash: Hash, signer: Option<&dyn SigningKeyPair>) -> LfbTicket {
    match signer {
        Some(signer) => LfbTicket::signed(round, hash, signer).unwrap_or_else(|e| {
            warn!(round, error = %e, "Failed to sign initial LFB ticket");
            LfbTicket::unsigned(round, NodeId::from_public_key(&signer.public_key_bytes()), hash)
        }),
        None => LfbTicket::unsigned(round, NodeId::default(), hash),
    }
}

/// Cloneable front end of the ticket worker.
#[derive(Clone)]
pub struct LfbTicketHandle {
    commands: mpsc::Sender<Command>,
    shutdown: Arc<watch::Sender<bool>>,
    done: watch::Receiver<bool>,
    verifier: Arc<TicketVerifier>,
    ahead: u64,
}

impl LfbTicketHandle {
    async fn send(&self, ctx: &Context, command: Command) -> LfbTicketResult<()> {
        if let Some(e) = ctx.err() {
            return Err(e.into());
        }
        tokio::select! {
            sent = self.commands.send(command) => sent.map_err(|_| LfbTicketError::Stopped),
            e = ctx.cancelled() => Err(e.into()),
        }
    }

    fn try_send(&self, command: Command) -> LfbTicketResult<()> {
        self.commands.try_send(command).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => LfbTicketError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => LfbTicketError::Stopped,
        })
    }

    /// Verify a ticket that arrived from a peer and hand it to the worker.
    pub async fn receive(&self, ctx: &Context, ticket: LfbTicket) -> LfbTicketResult<()> {
        if let Err(e) = self.verifier.verify(&ticket) {
            debug!(round = ticket.round, sharder = %ticket.sharder_id, error = %e, "Rejected LFB ticket");
            return Err(e);
        }
        self.send(ctx, Command::Update(ticket)).await
    }

    /// Raise the latest round locally, e.g. after learning a sharder's LFB
    /// by asking for it.
    pub async fn bump(&self, ctx: &Context, round: RoundNumber) -> LfbTicketResult<()> {
        self.send(ctx, Command::Update(LfbTicket::bump(round))).await
    }

    /// Announce a newly finalized block. No-op on miners.
    pub async fn broadcast(&self, ctx: &Context, round: RoundNumber, hash: Hash) -> LfbTicketResult<()> {
        self.send(ctx, Command::Broadcast { round, hash }).await
    }

    /// Non-blocking [`broadcast`](Self::broadcast) for callers holding locks.
    pub fn try_broadcast(&self, round: RoundNumber, hash: Hash) -> LfbTicketResult<()> {
        self.try_send(Command::Broadcast { round, hash })
    }

    /// Register a sink for tickets that advance the latest round.
    ///
    /// Tickets are pushed with `try_send`; a full sink misses them. A
    /// closed sink is dropped on the next delivery.
    pub async fn subscribe(&self, sink: mpsc::Sender<LfbTicket>) -> SubscribeOutcome {
        let (ack, reply) = oneshot::channel();
        if self.commands.send(Command::Subscribe { sink, ack }).await.is_err() {
            return SubscribeOutcome::ServiceStopped;
        }
        reply.await.unwrap_or(SubscribeOutcome::ServiceStopped)
    }

    /// Remove a sink. Does nothing once the worker has stopped.
    pub async fn unsubscribe(&self, sink: &mpsc::Sender<LfbTicket>) {
        let _ = self.commands.send(Command::Unsubscribe(sink.clone())).await;
    }

    /// Latest ticket generated or received.
    pub async fn latest(&self, ctx: &Context) -> LfbTicketResult<LfbTicket> {
        let (reply, rx) = oneshot::channel();
        self.send(ctx, Command::Latest(reply)).await?;
        tokio::select! {
            ticket = rx => ticket.map_err(|_| LfbTicketError::Stopped),
            e = ctx.cancelled() => Err(e.into()),
        }
    }

    /// Whether this node is behind the network as seen through tickets.
    pub async fn is_syncing(
        &self,
        ctx: &Context,
        lfb_round: RoundNumber,
        current_round: RoundNumber,
    ) -> LfbTicketResult<bool> {
        let ticket = self.latest(ctx).await?;
        Ok(current_round < ticket.round
            || lfb_round + SYNC_LAG_ROUNDS < ticket.round
            || lfb_round + self.ahead < current_round)
    }

    /// Ask the worker to exit.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.done.borrow()
    }

    /// Resolves once the worker has exited.
    pub async fn stopped(&self) {
        let mut done = self.done.clone();
        loop {
            if *done.borrow_and_update() {
                return;
            }
            if done.changed().await.is_err() {
                return;
            }
        }
    }
}
