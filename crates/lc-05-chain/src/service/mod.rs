//! # Chain Coordinator
//!
//! [`Chain`] owns the block, round and magic-block stores and drives
//! finalization. Each shared map sits behind its own lock; no lock is held
//! across an await or a call into the fetcher.
//!
//! ```text
//!   add_block ─────────► blocks ──┐
//!   add_round_block ───► rounds ──┼──► try_finalize ──► LFB ──► finalized queues
//!   (fetcher) ─────────► blocks ──┘          │                  bus events
//!                                            ▼                  LFB ticket
//!                                     view change ──► magic blocks ──► saver, hook
//! ```
//!
//! Operations are split by concern across the submodules.

mod blocks;
mod finalization;
mod genesis;
mod membership;
mod pruning;
mod rounds;
mod sharding;
mod snapshot;
mod state;

#[cfg(test)]
mod tests;

pub use finalization::{FinalizationOutcome, FinalizationStop};

use crate::adapters::{ChainFetchCompletion, ChainFetchTargets, InMemoryEntityStore};
use crate::config::ChainConfig;
use crate::domain::{
    BlockStore, ChainStats, ChainStatsSnapshot, DefaultRoundFactory, FeeStats, MagicBlockStorage,
    PruneStats, Round, RoundFactory, RoundStore,
};
use crate::error::{ChainError, ChainResult};
use crate::ports::{
    AfterFetcher, ChainApi, EntityStore, FetchedNotarizedBlockHandler, MagicBlockSaver,
    StateNodeSource, ViewChanger,
};
use async_trait::async_trait;
use lc_01_node_pool::{HashPoolScorer, NodeRegistry, PoolScorer};
use lc_02_state_trie::{InMemoryTrieDb, StateTrie, TrieDatabase, EMPTY_ROOT};
use lc_03_lfb_ticket::{LfbTicket, LfbTicketHandle};
use lc_04_block_fetcher::{BlockFetcher, BlockFetcherHandle, BlockSource, FetcherConfig};
use parking_lot::{Mutex, RwLock};
use shared_bus::{ChainEvent, InMemoryEventBus};
use shared_crypto::{resolve_scheme, SignatureScheme};
use shared_types::{Block, Context, Hash, MagicBlock, NodeId, RoundNumber, ZERO_HASH};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::info;

/// Collaborators the coordinator is built with.
#[derive(Clone)]
pub struct ChainDependencies {
    pub entity_store: Arc<dyn EntityStore>,
    pub trie_db: Arc<dyn TrieDatabase>,
    pub registry: Arc<NodeRegistry>,
    pub bus: Arc<InMemoryEventBus>,
    pub scorer: Arc<dyn PoolScorer>,
    pub round_factory: Arc<dyn RoundFactory>,
}

impl ChainDependencies {
    /// Everything in memory, with the hash scorer and plain rounds.
    pub fn in_memory() -> Self {
        Self {
            entity_store: Arc::new(InMemoryEntityStore::new()),
            trie_db: Arc::new(InMemoryTrieDb::new()),
            registry: Arc::new(NodeRegistry::new()),
            bus: Arc::new(InMemoryEventBus::new()),
            scorer: Arc::new(HashPoolScorer),
            round_factory: Arc::new(DefaultRoundFactory),
        }
    }
}

#[derive(Default)]
struct Hooks {
    magic_block_saver: Option<Arc<dyn MagicBlockSaver>>,
    view_changer: Option<Arc<dyn ViewChanger>>,
    after_fetcher: Option<Arc<dyn AfterFetcher>>,
    fetched_notarized: Option<Arc<dyn FetchedNotarizedBlockHandler>>,
    state_nodes: Option<Arc<dyn StateNodeSource>>,
}

/// The chain coordinator.
pub struct Chain {
    config: ChainConfig,
    scheme: Arc<dyn SignatureScheme>,
    scorer: Arc<dyn PoolScorer>,
    registry: Arc<NodeRegistry>,
    round_factory: Arc<dyn RoundFactory>,
    entity_store: Arc<dyn EntityStore>,
    trie: StateTrie,
    bus: Arc<InMemoryEventBus>,

    hooks: RwLock<Hooks>,
    fetcher: RwLock<Option<BlockFetcherHandle>>,
    lfb_tickets: RwLock<Option<LfbTicketHandle>>,

    chain_id: RwLock<Hash>,
    blocks: RwLock<BlockStore>,
    rounds: RwLock<RoundStore>,
    magic_blocks: RwLock<MagicBlockStorage>,
    state_root: RwLock<Hash>,
    stake: RwLock<HashMap<NodeId, u64>>,
    genesis: RwLock<Option<Arc<Block>>>,
    lfb: RwLock<Option<Arc<Block>>>,
    ldb: RwLock<Option<Arc<Block>>>,
    lfmb: RwLock<Option<Arc<MagicBlock>>>,

    generate_timeout: Mutex<Duration>,
    retry_wait_time: Mutex<Duration>,
    /// Serializes magic-block application and activation.
    membership_lock: Mutex<()>,
    /// One finalization pass at a time.
    finalization_lock: Mutex<()>,

    current_round: AtomicU64,
    latest_own_finalized_round: AtomicU64,

    finalized_blocks_tx: mpsc::Sender<Arc<Block>>,
    finalized_rounds_tx: mpsc::Sender<Arc<Round>>,
    finalized_blocks_rx: Mutex<Option<mpsc::Receiver<Arc<Block>>>>,
    finalized_rounds_rx: Mutex<Option<mpsc::Receiver<Arc<Round>>>>,

    stats: ChainStats,
    fee_stats: Mutex<FeeStats>,
    prune_stats: RwLock<Option<PruneStats>>,
}

impl Chain {
    pub fn new(config: ChainConfig, deps: ChainDependencies) -> ChainResult<Self> {
        config.validate()?;
        let scheme = resolve_scheme(&config.signature_scheme)?;
        let (finalized_blocks_tx, finalized_blocks_rx) = mpsc::channel(config.finalized_queue_capacity);
        let (finalized_rounds_tx, finalized_rounds_rx) = mpsc::channel(config.finalized_queue_capacity);

        info!(
            scheme = scheme.name(),
            retention = config.retention_window,
            replication = config.replication_factor,
            "Chain coordinator created"
        );

        Ok(Self {
            generate_timeout: Mutex::new(config.generate_timeout),
            retry_wait_time: Mutex::new(config.retry_wait_time),
            config,
            scheme,
            scorer: deps.scorer,
            registry: deps.registry,
            round_factory: deps.round_factory,
            entity_store: deps.entity_store,
            trie: StateTrie::new(deps.trie_db),
            bus: deps.bus,
            hooks: RwLock::new(Hooks::default()),
            fetcher: RwLock::new(None),
            lfb_tickets: RwLock::new(None),
            chain_id: RwLock::new(ZERO_HASH),
            blocks: RwLock::new(BlockStore::new()),
            rounds: RwLock::new(RoundStore::new()),
            magic_blocks: RwLock::new(MagicBlockStorage::new()),
            state_root: RwLock::new(EMPTY_ROOT),
            stake: RwLock::new(HashMap::new()),
            genesis: RwLock::new(None),
            lfb: RwLock::new(None),
            ldb: RwLock::new(None),
            lfmb: RwLock::new(None),
            membership_lock: Mutex::new(()),
            finalization_lock: Mutex::new(()),
            current_round: AtomicU64::new(0),
            latest_own_finalized_round: AtomicU64::new(0),
            finalized_blocks_tx,
            finalized_rounds_tx,
            finalized_blocks_rx: Mutex::new(Some(finalized_blocks_rx)),
            finalized_rounds_rx: Mutex::new(Some(finalized_rounds_rx)),
            stats: ChainStats::default(),
            fee_stats: Mutex::new(FeeStats::default()),
            prune_stats: RwLock::new(None),
        })
    }

    // === WIRING ===

    pub fn set_magic_block_saver(&self, saver: Arc<dyn MagicBlockSaver>) {
        self.hooks.write().magic_block_saver = Some(saver);
    }

    pub fn set_view_changer(&self, view_changer: Arc<dyn ViewChanger>) {
        self.hooks.write().view_changer = Some(view_changer);
    }

    pub fn set_after_fetcher(&self, after_fetcher: Arc<dyn AfterFetcher>) {
        self.hooks.write().after_fetcher = Some(after_fetcher);
    }

    pub fn set_fetched_notarized_block_handler(&self, handler: Arc<dyn FetchedNotarizedBlockHandler>) {
        self.hooks.write().fetched_notarized = Some(handler);
    }

    pub fn set_state_node_source(&self, source: Arc<dyn StateNodeSource>) {
        self.hooks.write().state_nodes = Some(source);
    }

    pub fn attach_fetcher(&self, fetcher: BlockFetcherHandle) {
        *self.fetcher.write() = Some(fetcher);
    }

    pub fn attach_lfb_tickets(&self, tickets: LfbTicketHandle) {
        *self.lfb_tickets.write() = Some(tickets);
    }

    /// Spawn a block fetcher whose targets and completions resolve against
    /// this chain, and attach it.
    pub fn spawn_fetcher(
        self: &Arc<Self>,
        config: FetcherConfig,
        source: Arc<dyn BlockSource>,
        tickets: Option<mpsc::Receiver<LfbTicket>>,
    ) -> JoinHandle<()> {
        let targets = Arc::new(ChainFetchTargets::new(Arc::downgrade(self)));
        let completion = Arc::new(ChainFetchCompletion::new(Arc::downgrade(self)));
        let (handle, task) = BlockFetcher::spawn(config, source, targets, completion, tickets);
        self.attach_fetcher(handle);
        task
    }

    pub fn fetcher(&self) -> Option<BlockFetcherHandle> {
        self.fetcher.read().clone()
    }

    pub fn lfb_tickets(&self) -> Option<LfbTicketHandle> {
        self.lfb_tickets.read().clone()
    }

    /// The finalized-block queue. Only the first caller gets it.
    pub fn take_finalized_blocks(&self) -> Option<mpsc::Receiver<Arc<Block>>> {
        self.finalized_blocks_rx.lock().take()
    }

    /// The finalized-round queue. Only the first caller gets it.
    pub fn take_finalized_rounds(&self) -> Option<mpsc::Receiver<Arc<Round>>> {
        self.finalized_rounds_rx.lock().take()
    }

    // === ACCESSORS ===

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }

    pub fn chain_id(&self) -> Hash {
        *self.chain_id.read()
    }

    pub fn scheme(&self) -> &Arc<dyn SignatureScheme> {
        &self.scheme
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<InMemoryEventBus> {
        &self.bus
    }

    pub fn state_trie(&self) -> &StateTrie {
        &self.trie
    }

    /// State root of the latest finalized block.
    pub fn state_root(&self) -> Hash {
        *self.state_root.read()
    }

    pub fn stats(&self) -> ChainStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn fee_stats(&self) -> FeeStats {
        self.fee_stats.lock().clone()
    }

    pub fn prune_stats(&self) -> Option<PruneStats> {
        self.prune_stats.read().clone()
    }

    pub fn generate_timeout(&self) -> Duration {
        *self.generate_timeout.lock()
    }

    pub fn set_generate_timeout(&self, timeout: Duration) {
        *self.generate_timeout.lock() = timeout;
    }

    pub fn retry_wait_time(&self) -> Duration {
        *self.retry_wait_time.lock()
    }

    pub fn set_retry_wait_time(&self, wait: Duration) {
        *self.retry_wait_time.lock() = wait;
    }

    pub fn set_miner_stake(&self, miner: NodeId, stake: u64) {
        self.stake.write().insert(miner, stake);
    }

    pub fn miner_stake(&self, miner: &NodeId) -> u64 {
        self.stake.read().get(miner).copied().unwrap_or(0)
    }

    pub fn genesis_block(&self) -> Option<Arc<Block>> {
        self.genesis.read().clone()
    }

    pub fn latest_finalized_block(&self) -> Option<Arc<Block>> {
        self.lfb.read().clone()
    }

    pub fn latest_deterministic_block(&self) -> Option<Arc<Block>> {
        self.ldb.read().clone()
    }

    pub fn latest_finalized_magic_block(&self) -> Option<Arc<MagicBlock>> {
        self.lfmb.read().clone()
    }

    /// Highest round this node finalized itself. Telemetry only.
    pub fn latest_own_finalized_block_round(&self) -> RoundNumber {
        self.latest_own_finalized_round.load(Ordering::Acquire)
    }

    pub(crate) fn emit(&self, event: ChainEvent) {
        self.bus.emit(event);
    }

    /// Rounds below this are outside the retention window.
    pub(crate) fn retention_floor(&self) -> RoundNumber {
        self.lfb
            .read()
            .as_ref()
            .map(|lfb| lfb.round.saturating_sub(self.config.retention_window))
            .unwrap_or(0)
    }

    fn set_lfb(&self, block: Arc<Block>) {
        *self.lfb.write() = Some(block);
    }

    fn set_ldb(&self, block: Arc<Block>) {
        *self.ldb.write() = Some(block);
    }
}

#[async_trait]
impl ChainApi for Chain {
    fn add_block(&self, block: Block) -> ChainResult<Arc<Block>> {
        Chain::add_block(self, block)
    }

    fn get_block(&self, ctx: &Context, hash: &Hash) -> ChainResult<Arc<Block>> {
        Chain::get_block(self, ctx, hash)
    }

    async fn fetch_block(&self, ctx: &Context, hash: Hash, round: RoundNumber) -> ChainResult<Arc<Block>> {
        Chain::fetch_block(self, ctx, hash, round).await
    }

    fn latest_finalized_block(&self) -> Option<Arc<Block>> {
        Chain::latest_finalized_block(self)
    }

    fn current_round(&self) -> RoundNumber {
        Chain::current_round(self)
    }

    fn get_magic_block(&self, round: RoundNumber) -> ChainResult<Arc<MagicBlock>> {
        Chain::get_magic_block(self, round)
    }

    fn stats(&self) -> ChainStatsSnapshot {
        Chain::stats(self)
    }
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("current_round", &self.current_round())
            .field("lfb_round", &self.lfb.read().as_ref().map(|b| b.round))
            .field("blocks", &self.blocks.read().len())
            .field("rounds", &self.rounds.read().len())
            .finish()
    }
}

/// Error for lookups of a block hash.
pub(crate) fn block_not_found(hash: &Hash) -> ChainError {
    ChainError::BlockNotFound(shared_types::to_hex(hash))
}
