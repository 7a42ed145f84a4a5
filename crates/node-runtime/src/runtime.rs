//! # Node Runtime
//!
//! Wires the chain coordinator to its workers and owns their tasks.
//!
//! ## Startup Sequence
//!
//! 1. Build the chain over in-memory stores and attach the magic-block saver
//! 2. Install genesis, or restore the persisted genesis, magic blocks and LFB
//! 3. Start the LFB ticket worker and attach it
//! 4. Start the block fetcher, subscribed to LFB tickets
//! 5. Start the round pipeline
//! 6. Start maintenance: drains the finalized queues, prunes periodically
//! 7. Publish the chain as the process-wide server chain
//!
//! Shutdown runs the same list backwards.

use crate::config::NodeConfig;
use crate::genesis::{self, DevnetKeys};
use crate::network::OfflineBlockSource;
use anyhow::{Context as _, Result};
use lc_03_lfb_ticket::{
    LfbTicketHandle, LfbTicketService, NullBroadcaster, SharderDirectory, SubscribeOutcome, TicketVerifier,
};
use lc_05_chain::{
    clear_server_chain, set_server_chain, Chain, ChainDependencies, EntityStoreMagicBlockSaver, HashSeedSource,
    Round, RoundPipeline, RoundPipelineHandle,
};
use shared_types::{short_hex, Block, Context, RoundNumber};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A running node.
pub struct NodeRuntime {
    config: NodeConfig,
    chain: Arc<Chain>,
    pipeline: RoundPipelineHandle,
    tickets: LfbTicketHandle,
    /// Shutdown signal sender.
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl NodeRuntime {
    /// Build the chain and start every worker.
    pub async fn start(config: NodeConfig) -> Result<Self> {
        config.validate().context("invalid configuration")?;

        let deps = ChainDependencies::in_memory();
        let saver = Arc::new(EntityStoreMagicBlockSaver::new(deps.entity_store.clone()));
        let chain = Arc::new(Chain::new(config.chain.clone(), deps).context("creating chain")?);
        chain.set_magic_block_saver(saver.clone());

        let keys = DevnetKeys::derive(&config.devnet, &config.chain.signature_scheme)?;
        let lfb = genesis::initialize(&chain, &config.devnet, &keys, &saver)?;
        if let Some(id) = keys.own_id(&config.devnet) {
            info!(node = %id, role = ?config.devnet.role, "Running as devnet node");
        }

        let mut tasks = Vec::with_capacity(4);

        let directory: Arc<dyn SharderDirectory> = chain.registry().clone();
        let verifier = TicketVerifier::new(directory, chain.scheme().clone());
        let (tickets, tickets_task) = LfbTicketService::spawn(
            config.lfb_ticket.clone(),
            lfb.round,
            lfb.hash,
            keys.ticket_signer(&config.devnet),
            Arc::new(NullBroadcaster),
            verifier,
        );
        chain.attach_lfb_tickets(tickets.clone());
        tasks.push(("lfb-ticket", tickets_task));

        let (sink, ticket_rx) = mpsc::channel(config.lfb_ticket.command_capacity.max(1));
        let ticket_rx = match tickets.subscribe(sink).await {
            SubscribeOutcome::Registered | SubscribeOutcome::AlreadySubscribed => Some(ticket_rx),
            SubscribeOutcome::ServiceStopped => {
                warn!("LFB ticket worker stopped before the fetcher subscribed");
                None
            }
        };
        let fetcher_task = chain.spawn_fetcher(config.fetcher.clone(), Arc::new(OfflineBlockSource), ticket_rx);
        tasks.push(("block-fetcher", fetcher_task));

        let (pipeline, pipeline_task) = RoundPipeline::spawn(chain.clone(), Arc::new(HashSeedSource));
        tasks.push(("round-pipeline", pipeline_task));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let maintenance = Maintenance::new(&chain, config.devnet.prune_interval, shutdown_rx)
            .context("finalized queues already taken")?;
        tasks.push(("maintenance", tokio::spawn(maintenance.run())));

        if set_server_chain(chain.clone()).is_some() {
            warn!("Replaced a previously published server chain");
        }

        info!(
            chain_id = %short_hex(&chain.chain_id()),
            lfb = lfb.round,
            generate_timeout_ms = config.chain.generate_timeout.as_millis() as u64,
            "Node runtime started"
        );

        Ok(Self {
            config,
            chain,
            pipeline,
            tickets,
            shutdown_tx,
            tasks,
        })
    }

    pub fn chain(&self) -> &Arc<Chain> {
        &self.chain
    }

    pub fn pipeline(&self) -> &RoundPipelineHandle {
        &self.pipeline
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Stop every worker and wait for it to exit.
    pub async fn shutdown(self) {
        info!("Initiating graceful shutdown...");

        self.shutdown_tx.send_replace(true);
        self.pipeline.shutdown();
        if let Some(fetcher) = self.chain.fetcher() {
            fetcher.shutdown();
        }
        self.tickets.shutdown();

        for (name, task) in self.tasks.into_iter().rev() {
            if let Err(e) = task.await {
                error!(task = name, error = %e, "Worker task failed");
            }
        }

        clear_server_chain();

        match serde_json::to_string(&self.chain.stats()) {
            Ok(stats) => info!(%stats, "Chain statistics"),
            Err(e) => warn!(error = %e, "Could not encode chain statistics"),
        }
        info!("Shutdown complete");
    }
}

/// Consumer of the finalized queues.
///
/// Rounds below the retention window are dropped and state is pruned every
/// `prune_interval` finalized rounds.
struct Maintenance {
    chain: Arc<Chain>,
    blocks: mpsc::Receiver<Arc<Block>>,
    rounds: mpsc::Receiver<Arc<Round>>,
    prune_interval: u64,
    shutdown: watch::Receiver<bool>,
}

impl Maintenance {
    fn new(chain: &Arc<Chain>, prune_interval: u64, shutdown: watch::Receiver<bool>) -> Option<Self> {
        Some(Self {
            chain: chain.clone(),
            blocks: chain.take_finalized_blocks()?,
            rounds: chain.take_finalized_rounds()?,
            prune_interval,
            shutdown,
        })
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.changed() => break,

                Some(block) = self.blocks.recv() => self.on_block(&block),

                Some(round) = self.rounds.recv() => self.on_round(round.number()),

                else => break,
            }
        }
    }

    fn due(&self, round: RoundNumber) -> bool {
        self.prune_interval > 0 && round > 0 && round % self.prune_interval == 0
    }

    fn on_block(&self, block: &Block) {
        if !self.due(block.round) {
            return;
        }
        match self.chain.prune_chain(&Context::background(), block) {
            Ok(stats) => info!(
                round = stats.round,
                retained_from = stats.retained_from,
                blocks_deleted = stats.blocks_deleted,
                "Chain pruned"
            ),
            Err(e) => warn!(round = block.round, error = %e, "Pruning failed"),
        }
    }

    fn on_round(&self, round: RoundNumber) {
        if !self.due(round) {
            return;
        }
        let below = round.saturating_sub(self.chain.config().retention_window);
        self.chain.delete_rounds_below(below);
    }
}
