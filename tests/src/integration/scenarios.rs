//! # Chain Scenarios
//!
//! End-to-end flows through the public coordinator API:
//!
//! 1. Genesis path
//! 2. Single-round finalization
//! 3. Duplicate block
//! 4. Missing predecessor
//! 5. View change
//! 6. Sharder determinism

#[cfg(test)]
mod tests {
    use lc_05_chain::test_utils::TestNetwork;
    use lc_05_chain::{ActivationState, ChainResult, ViewChanger};
    use parking_lot::Mutex;
    use shared_bus::{ChainEvent, EventFilter, EventTopic};
    use shared_types::{from_hex, MagicBlock, NodeId};
    use std::sync::Arc;

    #[derive(Default)]
    struct RecordingViewChanger {
        applied: Mutex<Vec<Arc<MagicBlock>>>,
    }

    impl ViewChanger for RecordingViewChanger {
        fn view_change(&self, mb: &Arc<MagicBlock>) -> ChainResult<()> {
            self.applied.lock().push(mb.clone());
            Ok(())
        }
    }

    fn ids(mb: &MagicBlock) -> Vec<NodeId> {
        mb.miners.nodes().iter().map(|n| n.id).collect()
    }

    // =========================================================================
    // GENESIS
    // =========================================================================

    #[test]
    fn test_genesis_path() {
        let net = TestNetwork::new(3, 2);
        let chain = net.chain();
        let mut events = chain.bus().subscribe(EventFilter::topics(vec![EventTopic::Blocks]));

        let mb0 = net.genesis_magic_block();
        let (_, b0) = chain
            .generate_genesis_block(lc_05_chain::test_utils::TEST_CHAIN_ID, mb0.clone())
            .unwrap();
        let b0 = chain.add_genesis_block(b0).unwrap();

        assert_eq!(b0.round, 0);
        assert_eq!(chain.latest_finalized_block().unwrap().hash, b0.hash);
        assert_eq!(chain.get_magic_block(0).unwrap().hash, mb0.hash);
        let threshold = chain.get_notarization_threshold_count(mb0.miners.size());
        assert_eq!(chain.can_start_network(), mb0.miners.size() >= threshold);
        assert!(chain.can_start_network());
        assert!(events
            .drain()
            .contains(&ChainEvent::GenesisInitialized { block_hash: b0.hash }));

        // A second genesis is refused and changes nothing.
        let (_, again) = chain
            .generate_genesis_block(lc_05_chain::test_utils::TEST_CHAIN_ID, mb0)
            .unwrap();
        assert!(chain.add_genesis_block(again).is_err());
        assert_eq!(chain.genesis_block().unwrap().hash, b0.hash);
    }

    // =========================================================================
    // FINALIZATION
    // =========================================================================

    #[test]
    fn test_single_round_finalization() {
        let net = TestNetwork::new(3, 2);
        let (chain, b0) = net.chain_with_genesis();

        let r1 = chain.add_round(chain.create_round(1));
        assert!(chain.set_random_seed(&r1, 42));
        let b1 = net.notarize(net.block_with_seed(1, &b0, 42), 2);
        assert_eq!(b1.prev_hash, Some(b0.hash));

        let b1 = chain.add_round_block(&r1, b1).unwrap();
        assert_eq!(chain.latest_finalized_block().unwrap().hash, b1.hash);
        assert_eq!(chain.get_round(1).unwrap().finalized_hash(), Some(b1.hash));
    }

    #[test]
    fn test_duplicate_block() {
        let net = TestNetwork::new(3, 2);
        let (chain, b0) = net.chain_with_genesis();
        let before = chain.block_count();

        let b1 = net.block_with_seed(1, &b0, 42);
        let first = chain.add_block(b1.clone()).unwrap();
        let second = chain.add_block(b1).unwrap();

        assert_eq!(chain.block_count(), before + 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(chain.stats().duplicate_blocks, 1);
    }

    #[test]
    fn test_missing_predecessor_promotes_in_order() {
        let net = TestNetwork::new(3, 2);
        let (chain, b0) = net.chain_with_genesis();
        let mut finalized = chain.take_finalized_blocks().unwrap();

        let missing = net.notarize(net.block_with_seed(1, &b0, 11), 3);
        let b2 = net.notarize(net.block_with_seed(2, &missing, 22), 3);

        chain.add_block_no_previous(b2.clone()).unwrap();
        assert!(chain.is_no_previous(&b2.hash));
        assert_eq!(chain.latest_finalized_block().unwrap().hash, b0.hash);
        assert!(finalized.try_recv().is_err());

        chain.add_block(missing.clone()).unwrap();
        assert_eq!(finalized.try_recv().unwrap().hash, missing.hash);
        assert_eq!(finalized.try_recv().unwrap().hash, b2.hash);
        assert_eq!(chain.latest_finalized_block().unwrap().hash, b2.hash);
    }

    // =========================================================================
    // MEMBERSHIP
    // =========================================================================

    #[test]
    fn test_view_change() {
        let net = TestNetwork::new(3, 2);
        let (chain, b0) = net.chain_with_genesis();
        let recorder = Arc::new(RecordingViewChanger::default());
        chain.set_view_changer(recorder.clone());

        let mb0 = chain.get_magic_block(0).unwrap();
        // Same seeds, one more miner.
        let grown = TestNetwork::new(4, 2);
        let mb1 = grown.magic_block(2, 100, mb0.hash);
        let b1 = net.notarize(net.builder(1, &b0, 11).magic_block(mb1.clone()).build(), 3);
        chain.add_block(b1.clone()).unwrap();
        assert_eq!(chain.latest_finalized_block().unwrap().hash, b1.hash);

        assert_eq!(ids(&chain.get_magic_block(99).unwrap()), ids(&mb0));
        assert_eq!(chain.get_miners(99).unwrap().size(), 3);
        assert_eq!(ids(&chain.get_magic_block(100).unwrap()), ids(&mb1));
        assert_eq!(chain.get_miners(100).unwrap().size(), 4);
        assert_eq!(chain.get_miners(250).unwrap().size(), 4);

        let applied = recorder.applied.lock();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0].hash, mb1.hash);
        drop(applied);

        assert_eq!(chain.magic_block_state(100), Some(ActivationState::Pending));
        chain.set_current_round(100);
        assert_eq!(chain.magic_block_state(100), Some(ActivationState::Active));
    }

    // =========================================================================
    // SHARDING
    // =========================================================================

    #[test]
    fn test_sharder_determinism_across_instances() {
        let net = TestNetwork::new(3, 5);
        let (a, _) = net.chain_with_genesis();
        let (b, _) = net.chain_with_genesis();
        let hash = from_hex("24e23c52e2e40689fdb700180cd68ac083a42ed292d90cc021119adaa4d21509").unwrap();

        let pool_a = a.get_sharders(50).unwrap();
        let pool_b = b.get_sharders(50).unwrap();
        let mut selected = 0;
        for (na, nb) in pool_a.nodes().iter().zip(pool_b.nodes()) {
            assert_eq!(na.id, nb.id);
            let on_a = a.is_block_sharder_from_hash(50, &hash, na);
            assert_eq!(on_a, b.is_block_sharder_from_hash(50, &hash, nb));
            assert_eq!(on_a, a.is_block_sharder_from_hash(50, &hash, na));
            selected += usize::from(on_a);
        }
        assert_eq!(selected, a.config().replication_factor);
    }
}
