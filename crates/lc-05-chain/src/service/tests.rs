use super::*;
use crate::adapters::{InMemoryEntityStore, InMemoryRoundStorage, TrieStateNodeSource};
use crate::domain::{ActivationState, RoundPhase};
use crate::error::ErrorKind;
use crate::ports::{AfterFetcher, MagicBlockSaver, RoundStorage, ViewChanger};
use crate::test_utils::{TestNetwork, TEST_CHAIN_ID};
use parking_lot::Mutex as PlMutex;
use shared_bus::{EventFilter, EventTopic};
use shared_types::{NodeStatus, Transaction};
use std::sync::atomic::AtomicBool;

/// Notarize and add blocks for rounds `1..=rounds` on top of `genesis`.
fn extend(net: &TestNetwork, chain: &Chain, genesis: &Arc<Block>, rounds: u64) -> Vec<Arc<Block>> {
    let mut prev = genesis.clone();
    let mut added = Vec::new();
    for round in 1..=rounds {
        let block = net.notarize(net.block_with_seed(round, &prev, round * 11), 3);
        prev = chain.add_block(block).unwrap();
        added.push(prev.clone());
    }
    added
}

fn chain_on(store: Arc<InMemoryEntityStore>) -> Arc<Chain> {
    let deps = ChainDependencies {
        entity_store: store,
        ..ChainDependencies::in_memory()
    };
    Arc::new(Chain::new(ChainConfig::default(), deps).unwrap())
}

#[derive(Default)]
struct RecordingViewChanger {
    applied: PlMutex<Vec<u64>>,
}

impl ViewChanger for RecordingViewChanger {
    fn view_change(&self, mb: &Arc<MagicBlock>) -> ChainResult<()> {
        self.applied.lock().push(mb.magic_block_number);
        Ok(())
    }
}

/// Records saved magic blocks; fails the next save while `fail_next` is set.
#[derive(Default)]
struct FlakySaver {
    fail_next: AtomicBool,
    saved: PlMutex<Vec<u64>>,
}

impl MagicBlockSaver for FlakySaver {
    fn save_magic_block(&self, mb: &MagicBlock) -> ChainResult<()> {
        if self.fail_next.swap(false, Ordering::AcqRel) {
            return Err(ChainError::Storage("disk full".into()));
        }
        self.saved.lock().push(mb.magic_block_number);
        Ok(())
    }
}

#[derive(Default)]
struct RecordingAfterFetcher {
    seen: PlMutex<Vec<RoundNumber>>,
}

#[async_trait]
impl AfterFetcher for RecordingAfterFetcher {
    async fn after_fetch(&self, _ctx: &Context, block: &Arc<Block>) -> ChainResult<()> {
        self.seen.lock().push(block.round);
        Ok(())
    }
}

// =============================================================================
// BLOCKS
// =============================================================================

#[test]
fn test_add_block_is_idempotent() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let block = net.block_with_seed(1, &genesis, 5);

    let first = chain.add_block(block.clone()).unwrap();
    let second = chain.add_block(block).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(chain.block_count(), 2);
    let stats = chain.stats();
    assert_eq!(stats.blocks_added, 1);
    assert_eq!(stats.duplicate_blocks, 1);
}

#[test]
fn test_late_proof_finalizes_stored_block() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let block = net.block_with_seed(1, &genesis, 5);

    let plain = chain.add_block(block.clone()).unwrap();
    assert!(plain.notarization.is_none());
    assert_eq!(chain.latest_finalized_block().unwrap().round, 0);

    let upgraded = chain.add_block(net.notarize(block, 3)).unwrap();
    assert!(upgraded.notarization.is_some());
    assert_eq!(chain.latest_finalized_block().unwrap().hash, upgraded.hash);
    assert_eq!(chain.stats().duplicate_blocks, 1);
}

#[test]
fn test_add_block_rejects_tampered_hash() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let mut block = net.block_with_seed(1, &genesis, 5);
    block.creation_date += 1;

    let err = chain.add_block(block).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert_eq!(chain.stats().invalid_blocks, 1);
}

#[test]
fn test_get_block_miss_without_fetcher() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let ctx = Context::background();

    assert_eq!(chain.get_block(&ctx, &genesis.hash).unwrap().hash, genesis.hash);
    let err = chain.get_block(&ctx, &[9u8; 32]).unwrap_err();
    assert!(err.is_not_found());
}

// =============================================================================
// GENESIS
// =============================================================================

#[test]
fn test_genesis_installs_pointers_and_round_zero() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();

    assert_eq!(chain.latest_finalized_block().unwrap().hash, genesis.hash);
    assert_eq!(chain.latest_deterministic_block().unwrap().hash, genesis.hash);
    assert_eq!(chain.genesis_block().unwrap().hash, genesis.hash);
    assert_eq!(chain.chain_id(), shared_types::from_hex(TEST_CHAIN_ID).unwrap());
    assert_eq!(chain.state_root(), EMPTY_ROOT);
    assert_eq!(chain.magic_block_count(), 1);

    let round = chain.get_round(0).unwrap();
    assert_eq!(round.phase(), RoundPhase::Finalized);
    assert_eq!(round.finalized_hash(), Some(genesis.hash));

    let loaded = chain.load_genesis_block().unwrap().unwrap();
    assert_eq!(loaded.hash, genesis.hash);
    assert_eq!(chain.snapshot().unwrap().lfb_round, 0);
}

#[test]
fn test_genesis_only_once() {
    let net = TestNetwork::new(3, 2);
    let (chain, _genesis) = net.chain_with_genesis();
    let (_, again) = chain
        .generate_genesis_block(TEST_CHAIN_ID, net.genesis_magic_block())
        .unwrap();
    assert_eq!(chain.add_genesis_block(again).unwrap_err(), ChainError::GenesisAlreadySet);
}

#[test]
fn test_genesis_requires_magic_block() {
    let chain = TestNetwork::new(3, 2).chain();
    let block = Block::builder(0).random_seed(1).build();
    let err = chain.add_genesis_block(block).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(chain.latest_finalized_block().is_none());
}

// =============================================================================
// FINALIZATION
// =============================================================================

#[tokio::test]
async fn test_notarized_block_finalizes_round() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let mut events = chain.bus().subscribe(EventFilter::topics(vec![EventTopic::Blocks, EventTopic::Rounds]));
    let mut finalized = chain.take_finalized_blocks().unwrap();

    let round = chain.get_or_create_round(1);
    assert!(chain.set_random_seed(&round, 42));
    let block = net.notarize(net.block_with_seed(1, &genesis, 42), 2);
    let added = chain.add_round_block(&round, block).unwrap();

    assert_eq!(chain.latest_finalized_block().unwrap().hash, added.hash);
    assert_eq!(chain.current_round(), 1);
    assert_eq!(chain.latest_own_finalized_block_round(), 1);
    assert_eq!(round.phase(), RoundPhase::Finalized);
    assert_eq!(finalized.recv().await.unwrap().hash, added.hash);

    let events = events.drain();
    assert!(events.contains(&ChainEvent::BlockFinalized {
        round: 1,
        block_hash: added.hash
    }));
    assert!(events.contains(&ChainEvent::RoundFinalized { round: 1 }));
    assert_eq!(chain.snapshot().unwrap().lfb_hash, added.hash);
}

#[test]
fn test_best_ranked_block_wins() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let round = chain.get_or_create_round(1);
    chain.set_random_seed(&round, 42);

    let blocks: Vec<Block> = (0..3)
        .map(|i| {
            net.builder(1, &genesis, 42)
                .miner(net.miner_id(i))
                .build()
        })
        .collect();
    let ranked: Vec<(u32, Hash)> = blocks
        .iter()
        .map(|b| (chain.block_rank(&round, b), b.hash))
        .collect();
    let expected = ranked.iter().min().map(|(_, hash)| *hash).unwrap();

    // Stage every candidate before finalizing so the pass sees all three.
    for block in blocks {
        let block = net.notarize(block, 3);
        let rank = chain.block_rank(&round, &block);
        let stored = chain.blocks.write().insert(block).block;
        chain.blocks.write().mark_notarized(stored.hash);
        round.add_notarized_block(stored, rank);
    }

    let outcome = chain.try_finalize();
    assert_eq!(outcome.promoted, vec![expected]);
    assert_eq!(chain.latest_finalized_block().unwrap().hash, expected);
}

#[test]
fn test_missing_predecessor_defers_finalization() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let b1 = net.notarize(net.block_with_seed(1, &genesis, 11), 3);
    let b2 = net.notarize(net.block_with_seed(2, &b1, 22), 3);

    chain.add_block(b2.clone()).unwrap();
    assert!(chain.is_no_previous(&b2.hash));
    assert_eq!(chain.latest_finalized_block().unwrap().round, 0);

    chain.add_block(b1).unwrap();
    assert!(!chain.is_no_previous(&b2.hash));
    assert_eq!(chain.latest_finalized_block().unwrap().hash, b2.hash);
    assert_eq!(chain.stats().finalized_blocks, 2);
}

#[test]
fn test_insufficient_signatures_do_not_notarize() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let round = chain.get_or_create_round(1);
    chain.set_random_seed(&round, 42);
    let block = net.notarize(net.block_with_seed(1, &genesis, 42), 1);

    let err = chain.add_round_block(&round, block).unwrap_err();
    assert!(matches!(err, ChainError::InvalidNotarization { .. }));
    assert_eq!(chain.latest_finalized_block().unwrap().round, 0);
    assert!(!round.has_notarized_blocks());
}

#[test]
fn test_block_with_other_seed_is_never_finalized() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let round = chain.get_or_create_round(1);
    chain.set_random_seed(&round, 42);

    let foreign = net.notarize(net.block_with_seed(1, &genesis, 99), 3);
    let err = chain.add_round_block(&round, foreign.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert_eq!(chain.latest_finalized_block().unwrap().round, 0);
    assert!(!round.is_finalized());
    assert_eq!(chain.block_count(), 1);

    // Stored directly, it still does not qualify against the round's seed.
    chain.add_block(foreign).unwrap();
    assert_eq!(chain.try_finalize().stop, FinalizationStop::NoCandidate);
    assert_eq!(chain.latest_finalized_block().unwrap().round, 0);
    assert_eq!(round.random_seed(), Some(42));

    let own = net.notarize(net.block_with_seed(1, &genesis, 42), 3);
    let added = chain.add_round_block(&round, own).unwrap();
    assert_eq!(chain.latest_finalized_block().unwrap().hash, added.hash);
    assert_eq!(round.finalized_hash(), Some(added.hash));
}

#[test]
fn test_finalized_queue_backpressure() {
    let net = TestNetwork::new(3, 2);
    let config = ChainConfig::default().with_finalized_queue_capacity(1);
    let (chain, genesis) = net.chain_with_genesis_config(config);

    let blocks = extend(&net, &chain, &genesis, 2);
    assert_eq!(chain.latest_finalized_block().unwrap().round, 1);
    assert_eq!(chain.try_finalize().stop, FinalizationStop::Backpressure);

    let mut block_rx = chain.take_finalized_blocks().unwrap();
    let mut round_rx = chain.take_finalized_rounds().unwrap();
    assert_eq!(block_rx.try_recv().unwrap().hash, blocks[0].hash);
    assert_eq!(round_rx.try_recv().unwrap().number(), 1);

    let outcome = chain.try_finalize();
    assert_eq!(outcome.promoted, vec![blocks[1].hash]);
    assert_eq!(chain.latest_finalized_block().unwrap().round, 2);
}

#[test]
fn test_deterministic_block_needs_ratio() {
    let net = TestNetwork::new(10, 2);
    let (chain, genesis) = net.chain_with_genesis();
    // 7 of 10 notarizes; the LDB needs 8.
    let b1 = net.notarize(net.block_with_seed(1, &genesis, 11), 7);
    chain.add_block(b1.clone()).unwrap();
    assert_eq!(chain.latest_finalized_block().unwrap().hash, b1.hash);
    assert_eq!(chain.latest_deterministic_block().unwrap().round, 0);

    let b2 = net.notarize(net.block_with_seed(2, &b1, 22), 8);
    chain.add_block(b2.clone()).unwrap();
    assert_eq!(chain.latest_deterministic_block().unwrap().hash, b2.hash);
}

// =============================================================================
// ROUNDS
// =============================================================================

#[test]
fn test_round_seed_set_once() {
    let net = TestNetwork::new(3, 2);
    let (chain, _genesis) = net.chain_with_genesis();
    let round = chain.get_or_create_round(4);

    assert!(chain.set_random_seed(&round, 42));
    assert!(!chain.set_random_seed(&round, 43));
    assert_eq!(round.random_seed(), Some(42));
    assert_eq!(round.phase(), RoundPhase::Seeded);
}

#[test]
fn test_notarized_block_with_other_seed_needs_later_timeout() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let round = chain.get_or_create_round(1);
    chain.set_random_seed(&round, 42);

    let stale = Arc::new(net.notarize(net.block_with_seed(1, &genesis, 43), 3));
    let err = chain.add_notarized_block_to_round(&round, &stale).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert_eq!(round.random_seed(), Some(42));

    let retried = Arc::new(net.notarize(net.builder(1, &genesis, 43).timeout_count(1).build(), 3));
    chain.add_notarized_block_to_round(&round, &retried).unwrap();
    assert_eq!(round.random_seed(), Some(43));
    assert_eq!(round.timeout_count(), 1);
    assert_eq!(chain.latest_finalized_block().unwrap().hash, retried.hash);
}

#[test]
fn test_round_timeout_and_retry() {
    let net = TestNetwork::new(3, 2);
    let (chain, _genesis) = net.chain_with_genesis();
    let mut events = chain.bus().subscribe(EventFilter::topics(vec![EventTopic::Rounds]));
    let round = chain.get_or_create_round(1);
    chain.set_random_seed(&round, 42);

    assert!(chain.on_round_timeout(&round));
    assert_eq!(round.phase(), RoundPhase::TimedOut);
    assert!(chain.retry_round(&round, 77));
    assert_eq!(round.random_seed(), Some(77));
    assert_eq!(round.timeout_count(), 1);
    assert_eq!(
        events.drain(),
        vec![ChainEvent::RoundTimedOut {
            round: 1,
            timeout_count: 1
        }]
    );
}

#[test]
fn test_delete_rounds_below() {
    let net = TestNetwork::new(3, 2);
    let (chain, _genesis) = net.chain_with_genesis();
    for n in 1..=5 {
        chain.get_or_create_round(n);
    }
    assert_eq!(chain.delete_rounds_below(3), 3);
    assert!(chain.get_round(2).is_err());
    assert!(chain.get_round(3).is_ok());
    assert_eq!(chain.round_count(), 3);
    assert!(matches!(chain.get_round(1), Err(ChainError::RoundNotFound(1))));
}

#[test]
fn test_prune_round_storage_keeps_target_plus_one() {
    let net = TestNetwork::new(3, 2);
    let chain = net.chain();
    let kept = Arc::new(InMemoryRoundStorage::<u64>::new("round-data"));
    let untouched = Arc::new(InMemoryRoundStorage::<u64>::new("audit"));
    for round in 1..=10 {
        kept.put(round, round * 2);
        untouched.put(round, round);
    }
    let storages: Vec<Arc<dyn RoundStorage>> = vec![kept.clone(), untouched.clone()];

    chain
        .prune_round_storage(
            &Context::background(),
            |s| if s.name() == "audit" { 0 } else { 3 },
            &storages,
        )
        .unwrap();

    assert_eq!(kept.rounds(), vec![7, 8, 9, 10]);
    assert_eq!(untouched.len(), 10);
}

// =============================================================================
// MEMBERSHIP
// =============================================================================

#[test]
fn test_view_change_on_finalization() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let recorder = Arc::new(RecordingViewChanger::default());
    chain.set_view_changer(recorder.clone());
    let mut events = chain.bus().subscribe(EventFilter::topics(vec![EventTopic::Membership]));

    let mb1 = chain.get_magic_block(0).unwrap();
    let mb2 = net.magic_block(2, 10, mb1.hash);
    let block = net.notarize(net.builder(1, &genesis, 11).magic_block(mb2.clone()).build(), 3);
    chain.add_block(block.clone()).unwrap();

    assert_eq!(chain.latest_finalized_block().unwrap().hash, block.hash);
    assert_eq!(*recorder.applied.lock(), vec![2]);
    assert_eq!(chain.magic_block_count(), 2);
    assert_eq!(chain.get_magic_block(9).unwrap().magic_block_number, 1);
    assert_eq!(chain.get_magic_block(10).unwrap().hash, mb2.hash);
    assert_eq!(chain.magic_block_state(10), Some(ActivationState::Pending));
    assert_eq!(chain.stats().view_changes, 1);
    assert!(events.drain().contains(&ChainEvent::ViewChangeApplied {
        magic_block_number: 2,
        starting_round: 10,
        magic_block_hash: mb2.hash,
    }));

    chain.set_current_round(10);
    assert_eq!(chain.magic_block_state(10), Some(ActivationState::Active));
    assert!(events.drain().contains(&ChainEvent::MagicBlockActivated {
        magic_block_number: 2,
        starting_round: 10,
    }));
}

#[test]
fn test_invalid_magic_block_halts_finalization() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let unlinked = net.magic_block(2, 10, [0xEE; 32]);
    let block = net.notarize(net.builder(1, &genesis, 11).magic_block(unlinked).build(), 3);

    chain.add_block(block).unwrap();
    assert_eq!(chain.latest_finalized_block().unwrap().round, 0);
    assert!(matches!(
        chain.try_finalize().stop,
        FinalizationStop::Halted(ChainError::InvalidMagicBlock(_))
    ));
    assert_eq!(chain.magic_block_count(), 1);
}

#[test]
fn test_failed_magic_block_save_is_retried() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let saver = Arc::new(FlakySaver::default());
    saver.fail_next.store(true, Ordering::Release);
    chain.set_magic_block_saver(saver.clone());
    let recorder = Arc::new(RecordingViewChanger::default());
    chain.set_view_changer(recorder.clone());

    let mb1 = chain.get_magic_block(0).unwrap();
    let mb2 = net.magic_block(2, 10, mb1.hash);
    let block = net.notarize(net.builder(1, &genesis, 11).magic_block(mb2.clone()).build(), 3);
    chain.add_block(block.clone()).unwrap();

    assert_eq!(chain.latest_finalized_block().unwrap().round, 0);
    assert_eq!(chain.magic_block_count(), 1);
    assert!(saver.saved.lock().is_empty());

    let outcome = chain.try_finalize();
    assert_eq!(outcome.promoted, vec![block.hash]);
    assert_eq!(*saver.saved.lock(), vec![2]);
    assert_eq!(*recorder.applied.lock(), vec![2]);
    assert_eq!(chain.stats().view_changes, 1);
    assert_eq!(chain.get_magic_block(10).unwrap().hash, mb2.hash);
}

#[test]
fn test_set_magic_block_persists_before_storing() {
    let net = TestNetwork::new(3, 2);
    let (chain, _genesis) = net.chain_with_genesis();
    let saver = Arc::new(FlakySaver::default());
    chain.set_magic_block_saver(saver.clone());
    let mb1 = chain.get_magic_block(0).unwrap();

    saver.fail_next.store(true, Ordering::Release);
    let mb2 = net.magic_block(2, 30, mb1.hash);
    assert_eq!(chain.set_magic_block(mb2.clone()).unwrap_err().kind(), ErrorKind::Storage);
    assert_eq!(chain.magic_block_count(), 1);

    assert!(chain.set_magic_block(mb2.clone()).unwrap());
    assert!(!chain.set_magic_block(mb2).unwrap());
    let rival = net.magic_block(3, 30, mb1.hash);
    assert!(matches!(
        chain.set_magic_block(rival),
        Err(ChainError::MagicBlockConflict(30))
    ));
    assert_eq!(*saver.saved.lock(), vec![2]);
}

#[test]
fn test_update_magic_block_ignores_older() {
    let net = TestNetwork::new(3, 2);
    let (chain, _genesis) = net.chain_with_genesis();
    let mb1 = chain.get_magic_block(0).unwrap();
    let mb2 = net.magic_block(2, 50, mb1.hash);

    assert!(chain.update_magic_block(mb2.clone()).unwrap());
    assert!(!chain.update_magic_block(mb2.clone()).unwrap());
    let older = net.magic_block(3, 40, mb2.hash);
    assert!(!chain.update_magic_block(older).unwrap());
    let unlinked = net.magic_block(3, 60, [1; 32]);
    assert!(matches!(
        chain.update_magic_block(unlinked),
        Err(ChainError::InvalidMagicBlock(_))
    ));
}

#[test]
fn test_validate_magic_block() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let ctx = Context::background();
    let mb1 = chain.get_magic_block(0).unwrap();

    let plain = net.block_with_seed(1, &genesis, 1);
    chain.validate_magic_block(&ctx, 1, &plain).unwrap();

    let next = net.magic_block(2, 20, mb1.hash);
    let carrying = net.builder(5, &genesis, 1).magic_block(next).build();
    chain.validate_magic_block(&ctx, 5, &carrying).unwrap();

    let too_early = net.magic_block(2, 5, mb1.hash);
    let bad = net.builder(5, &genesis, 1).magic_block(too_early).build();
    assert!(matches!(
        chain.validate_magic_block(&ctx, 5, &bad),
        Err(ChainError::InvalidMagicBlock(_))
    ));

    let foreign = net
        .builder(1, &genesis, 1)
        .latest_finalized_magic_block_hash([3; 32])
        .build();
    assert_eq!(
        chain.validate_magic_block(&ctx, 1, &foreign).unwrap_err().kind(),
        ErrorKind::Invalid
    );
}

#[test]
fn test_generators_are_lowest_ranked_miners() {
    let net = TestNetwork::new(10, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let round = chain.get_or_create_round(1);
    chain.set_random_seed(&round, 1234);

    // max(2, ceil(10 * 20%)) = 2
    let generators = chain.get_generators(&round).unwrap();
    assert_eq!(generators.len(), 2);
    for (i, node) in generators.iter().enumerate() {
        assert_eq!(round.miner_rank(node.set_index), Some(i as u32));
    }

    let by_generator = net.builder(1, &genesis, 1234).miner(generators[0].id).build();
    assert!(chain.valid_generator(&round, &by_generator));
    let outsider = chain
        .get_miners(1)
        .unwrap()
        .nodes()
        .iter()
        .find(|n| round.miner_rank(n.set_index) == Some(9))
        .map(|n| n.id)
        .unwrap();
    let by_outsider = net.builder(1, &genesis, 1234).miner(outsider).build();
    assert!(!chain.valid_generator(&round, &by_outsider));
}

// =============================================================================
// SHARDING
// =============================================================================

#[test]
fn test_block_sharders_follow_replication_factor() {
    let net = TestNetwork::new(3, 4);
    let (chain, genesis) = net.chain_with_genesis();
    let block = net.block_with_seed(1, &genesis, 1);

    let sharders = chain.get_block_sharders(&block);
    assert_eq!(sharders.len(), 2);
    let pool = chain.get_sharders(1).unwrap();
    let eligible = pool
        .nodes()
        .iter()
        .filter(|s| chain.is_block_sharder(&block, s))
        .count();
    assert_eq!(eligible, 2);

    let ranked = chain.ranked_sharders(1, &block.hash);
    assert_eq!(ranked.len(), 4);
    assert!(sharders.contains(&ranked[0].id));

    let (ok, top) = chain.can_shard_block_with_replicators(1, &block.hash, &ranked[0]);
    assert!(ok);
    assert_eq!(top.len(), 2);
}

#[test]
fn test_block_sharders_depend_on_hash_not_round() {
    let net = TestNetwork::new(3, 5);
    let (chain, genesis) = net.chain_with_genesis();
    let block = net.block_with_seed(1, &genesis, 1);
    let pool = chain.get_sharders(1).unwrap();

    let expected: Vec<NodeId> = lc_01_node_pool::score_nodes(pool.nodes(), &block.hash)
        .iter()
        .map(|s| s.node.id)
        .collect();
    let ranked = |round| -> Vec<NodeId> { chain.ranked_sharders(round, &block.hash).iter().map(|n| n.id).collect() };
    assert_eq!(ranked(1), expected);
    // Same magic block, other round: same assignment.
    assert_eq!(ranked(7), expected);
    for sharder in pool.nodes() {
        assert_eq!(
            chain.is_block_sharder_from_hash(1, &block.hash, sharder),
            chain.is_block_sharder_from_hash(7, &block.hash, sharder)
        );
    }
}

#[test]
fn test_replication_zero_means_every_sharder() {
    let net = TestNetwork::new(3, 4);
    let config = ChainConfig::default().with_replication_factor(0);
    let (chain, genesis) = net.chain_with_genesis_config(config);
    let block = net.block_with_seed(1, &genesis, 1);

    assert_eq!(chain.get_block_sharders(&block).len(), 4);
    for sharder in chain.get_sharders(1).unwrap().nodes() {
        assert!(chain.is_block_sharder(&block, sharder));
    }
}

#[test]
fn test_network_start_needs_active_nodes() {
    let net = TestNetwork::new(3, 4);
    let config = ChainConfig::default().with_min_active(75, 50);
    let (chain, genesis) = net.chain_with_genesis_config(config);
    let block = net.block_with_seed(1, &genesis, 1);
    assert!(chain.can_start_network());
    assert!(chain.can_shard_blocks(1));
    assert!(chain.can_replicate_block(&block));

    let sharders = chain.get_sharders(0).unwrap();
    sharders.nodes()[0].set_status(NodeStatus::Inactive);
    sharders.nodes()[1].set_status(NodeStatus::Inactive);
    assert!(!chain.can_start_network());
    assert!(!chain.can_shard_blocks(1));

    let miners = chain.get_miners(0).unwrap();
    miners.nodes()[0].set_status(NodeStatus::Inactive);
    miners.nodes()[1].set_status(NodeStatus::Inactive);
    assert!(!chain.can_start_network());
}

// =============================================================================
// TRANSACTIONS
// =============================================================================

#[test]
fn test_chain_has_transaction() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let ctx = Context::background();
    let client = net.miner_id(0);
    let t1 = Transaction::new(client, b"pay".to_vec(), 3, genesis.creation_date + 1);

    let b1 = net.notarize(
        net.builder(1, &genesis, 11).transactions(vec![t1.clone()]).build(),
        3,
    );
    let b1 = chain.add_block(b1).unwrap();
    assert_eq!(chain.latest_deterministic_block().unwrap().hash, b1.hash);
    let b2 = chain.add_block(net.block_with_seed(2, &b1, 22)).unwrap();

    assert!(chain.chain_has_transaction(&ctx, &b2, &t1).unwrap());

    let future = Transaction::new(client, b"later".to_vec(), 1, b2.creation_date + 1_000);
    assert!(!chain.chain_has_transaction(&ctx, &b2, &future).unwrap());

    let absent = Transaction::new(client, b"absent".to_vec(), 1, genesis.creation_date + 1);
    assert!(matches!(
        chain.chain_has_transaction(&ctx, &b2, &absent),
        Err(ChainError::InsufficientChain(1))
    ));

    let orphan = net.block_with_seed(3, &net.block_with_seed(2, &b1, 99), 33);
    let err = chain.chain_has_transaction(&ctx, &orphan, &absent).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_fee_stats_track_finalized_transactions() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let client = net.miner_id(1);
    let txns = vec![
        Transaction::new(client, b"a".to_vec(), 2, 1),
        Transaction::new(client, b"b".to_vec(), 10, 1),
    ];
    let b1 = net.notarize(net.builder(1, &genesis, 11).transactions(txns).build(), 3);
    chain.add_block(b1).unwrap();

    let fees = chain.fee_stats();
    assert_eq!(fees.count, 2);
    assert_eq!(fees.min_fees, 2);
    assert_eq!(fees.max_fees, 10);
    assert_eq!(fees.mean_fees, 6);
}

// =============================================================================
// STATE
// =============================================================================

#[test]
fn test_prune_chain_keeps_retention_window() {
    let net = TestNetwork::new(3, 2);
    let config = ChainConfig::default().with_retention_window(2);
    let (chain, genesis) = net.chain_with_genesis_config(config);
    let mut events = chain.bus().subscribe(EventFilter::topics(vec![EventTopic::State]));

    let trie = chain.state_trie().clone();
    let mut root = EMPTY_ROOT;
    let mut prev = genesis.clone();
    for round in 1..=5u64 {
        root = trie
            .insert(&root, format!("account-{round}").as_bytes(), round.to_be_bytes().to_vec())
            .unwrap();
        let block = net.notarize(net.builder(round, &prev, round).state_root(root).build(), 3);
        prev = chain.add_block(block).unwrap();
    }
    assert_eq!(chain.latest_finalized_block().unwrap().round, 5);
    assert_eq!(chain.state_root(), root);

    let stats = chain.prune_chain(&Context::background(), &prev).unwrap();
    assert_eq!(stats.retained_from, 3);
    assert_eq!(stats.blocks_deleted, 2);
    assert!(stats.state.deleted > 0);
    assert!(chain.has_block(&genesis.hash));
    assert_eq!(
        chain.get_block_state_node(&prev, b"account-1").unwrap(),
        1u64.to_be_bytes().to_vec()
    );
    assert_eq!(chain.prune_stats().unwrap().round, 5);
    let pruned = events.drain();
    assert!(matches!(pruned.as_slice(), [ChainEvent::StatePruned { round: 5, .. }]));

    let stale = net.block_with_seed(2, &genesis, 2);
    assert!(matches!(chain.add_block(stale), Err(ChainError::Stale { round: 2, floor: 3 })));
}

#[test]
fn test_get_block_state_node_missing_path() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let err = chain.get_block_state_node(&genesis, b"nobody").unwrap_err();
    assert!(matches!(err, ChainError::StateNodeNotFound(_)));
}

#[tokio::test]
async fn test_init_block_state_from_peer() {
    let net = TestNetwork::new(3, 2);
    let (source, _) = net.chain_with_genesis();
    let (chain, genesis) = net.chain_with_genesis();

    let trie = source.state_trie();
    let mut root = EMPTY_ROOT;
    for key in ["alice", "bob", "carol", "dave"] {
        root = trie.insert(&root, key.as_bytes(), key.len().to_be_bytes().to_vec()).unwrap();
    }
    let block = net.builder(1, &genesis, 1).state_root(root).build();
    let ctx = Context::background();

    assert!(matches!(
        chain.init_block_state(&ctx, &block).await,
        Err(ChainError::StateNodeNotFound(_))
    ));

    chain.set_state_node_source(Arc::new(TrieStateNodeSource::new(trie.clone())));
    chain.init_block_state(&ctx, &block).await.unwrap();
    assert_eq!(
        chain.get_block_state_node(&block, b"carol").unwrap(),
        5usize.to_be_bytes().to_vec()
    );
    assert!(chain.state_trie().missing_nodes(&root).unwrap().is_empty());
}

// =============================================================================
// RESTART
// =============================================================================

#[test]
fn test_loaded_finalized_blocks_restore_tip() {
    let net = TestNetwork::new(3, 2);
    let store = Arc::new(InMemoryEntityStore::new());

    let first = chain_on(store.clone());
    let (_, genesis) = first
        .generate_genesis_block(TEST_CHAIN_ID, net.genesis_magic_block())
        .unwrap();
    let genesis = first.add_genesis_block(genesis).unwrap();
    let blocks = extend(&net, &first, &genesis, 2);
    let lfb = blocks[1].clone();

    let restarted = chain_on(store.clone());
    let loaded = restarted
        .add_loaded_finalized_blocks((*lfb).clone(), (*genesis).clone())
        .unwrap();
    assert_eq!(loaded.hash, lfb.hash);
    assert_eq!(restarted.latest_finalized_block().unwrap().hash, lfb.hash);
    assert_eq!(restarted.current_round(), 2);
    assert_eq!(restarted.genesis_block().unwrap().hash, genesis.hash);
    assert!(restarted.get_round(2).unwrap().is_finalized());

    let mismatched = chain_on(store);
    let err = mismatched
        .add_loaded_finalized_blocks((*blocks[0]).clone(), (*genesis).clone())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);
    assert!(mismatched.latest_finalized_block().is_none());
}

#[test]
fn test_genesis_reload_keeps_persisted_tip() {
    let net = TestNetwork::new(3, 2);
    let store = Arc::new(InMemoryEntityStore::new());

    let first = chain_on(store.clone());
    let (_, genesis) = first
        .generate_genesis_block(TEST_CHAIN_ID, net.genesis_magic_block())
        .unwrap();
    let genesis = first.add_genesis_block(genesis).unwrap();
    let blocks = extend(&net, &first, &genesis, 2);

    let restarted = chain_on(store);
    let reloaded = restarted.load_genesis_block().unwrap().unwrap();
    restarted.add_genesis_block(reloaded).unwrap();
    assert_eq!(restarted.read_snapshot().unwrap().unwrap().lfb_round, 2);

    let (lfb, lfmb) = restarted.load_finalized_blocks().unwrap().unwrap();
    assert_eq!(lfb.hash, blocks[1].hash);
    assert_eq!(lfmb.hash, genesis.hash);
    restarted.add_loaded_finalized_blocks(lfb, lfmb).unwrap();
    assert_eq!(restarted.latest_finalized_block().unwrap().hash, blocks[1].hash);
}

#[test]
fn test_nothing_to_load_before_first_snapshot() {
    let chain = TestNetwork::new(3, 2).chain();
    assert!(chain.load_finalized_blocks().unwrap().is_none());
}

// =============================================================================
// FETCH INTEGRATION
// =============================================================================

#[tokio::test]
async fn test_fetched_notarized_block_is_finalized() {
    let net = TestNetwork::new(3, 2);
    let (chain, genesis) = net.chain_with_genesis();
    let after = Arc::new(RecordingAfterFetcher::default());
    chain.set_after_fetcher(after.clone());
    let mut events = chain.bus().subscribe(EventFilter::topics(vec![EventTopic::Fetch]));

    let block = net.notarize(net.block_with_seed(1, &genesis, 11), 3);
    let stored = chain.on_block_fetched(block, true).await.unwrap();

    assert_eq!(chain.latest_finalized_block().unwrap().hash, stored.hash);
    assert_eq!(*after.seen.lock(), vec![1]);
    assert_eq!(
        events.drain(),
        vec![ChainEvent::BlockFetched {
            hash: stored.hash,
            round: 1
        }]
    );
}

#[tokio::test]
async fn test_fetch_block_without_fetcher_is_not_found() {
    let net = TestNetwork::new(3, 2);
    let (chain, _genesis) = net.chain_with_genesis();
    let err = chain
        .fetch_block(&Context::background(), [4; 32], 3)
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}
