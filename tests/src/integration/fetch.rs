//! # Chain + Block Fetcher
//!
//! The coordinator wired to a real fetcher worker whose transport is a
//! mock peer holding a prebuilt chain.

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use lc_04_block_fetcher::{BlockSource, FetchError, FetchResult, FetcherConfig};
    use lc_05_chain::test_utils::TestNetwork;
    use lc_05_chain::{Chain, ErrorKind};
    use parking_lot::Mutex;
    use shared_bus::{ChainEvent, EventFilter, EventTopic};
    use shared_types::{short_hex, Block, Context, Hash, Node, RoundNumber};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Every peer serves the same set of blocks.
    #[derive(Default)]
    struct MockPeers {
        blocks: Mutex<HashMap<Hash, Block>>,
        requests: AtomicUsize,
    }

    impl MockPeers {
        fn serve(&self, block: &Block) {
            self.blocks.lock().insert(block.hash, block.clone());
        }

        fn lookup(&self, hash: &Hash) -> FetchResult<Block> {
            self.requests.fetch_add(1, Ordering::SeqCst);
            self.blocks
                .lock()
                .get(hash)
                .cloned()
                .ok_or_else(|| FetchError::NotFound(short_hex(hash)))
        }
    }

    #[async_trait]
    impl BlockSource for MockPeers {
        async fn fetch_notarized(
            &self,
            _ctx: &Context,
            _miner: &Node,
            hash: &Hash,
            _round: RoundNumber,
        ) -> FetchResult<Block> {
            self.lookup(hash)
        }

        async fn fetch_finalized(
            &self,
            _ctx: &Context,
            _sharder: &Node,
            hash: &Hash,
            _round: RoundNumber,
        ) -> FetchResult<Block> {
            self.lookup(hash)
        }
    }

    fn config() -> FetcherConfig {
        FetcherConfig {
            max_attempts: 3,
            request_timeout: Duration::from_millis(200),
            ..FetcherConfig::default()
        }
    }

    async fn wait_for_lfb(chain: &Chain, round: RoundNumber) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while chain.latest_finalized_block().map(|b| b.round) != Some(round) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("LFB did not advance");
    }

    #[tokio::test]
    async fn test_missing_predecessor_is_fetched_and_finalized() {
        let net = TestNetwork::new(3, 2);
        let (chain, b0) = net.chain_with_genesis();
        let peers = Arc::new(MockPeers::default());
        let task = chain.spawn_fetcher(config(), peers.clone(), None);
        let mut events = chain.bus().subscribe(EventFilter::topics(vec![EventTopic::Fetch]));

        let b1 = net.notarize(net.block_with_seed(1, &b0, 11), 3);
        let b2 = net.notarize(net.block_with_seed(2, &b1, 22), 3);
        peers.serve(&b1);

        chain.add_block(b2.clone()).unwrap();
        wait_for_lfb(&chain, 2).await;

        assert!(chain.has_block(&b1.hash));
        assert!(!chain.is_no_previous(&b2.hash));
        assert!(events.drain().contains(&ChainEvent::BlockFetched {
            hash: b1.hash,
            round: 1
        }));

        chain.fetcher().unwrap().shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_fetch_block_waits_for_peer() {
        let net = TestNetwork::new(3, 2);
        let (chain, b0) = net.chain_with_genesis();
        let peers = Arc::new(MockPeers::default());
        let task = chain.spawn_fetcher(config(), peers.clone(), None);

        let b1 = net.notarize(net.block_with_seed(1, &b0, 11), 3);
        peers.serve(&b1);

        let ctx = Context::background();
        let fetched = chain.fetch_block(&ctx, b1.hash, 1).await.unwrap();
        assert_eq!(fetched.hash, b1.hash);
        assert!(chain.has_block(&b1.hash));
        assert_eq!(chain.latest_finalized_block().unwrap().hash, b1.hash);

        // Served locally from now on.
        let served = peers.requests.load(Ordering::SeqCst);
        chain.fetch_block(&ctx, b1.hash, 1).await.unwrap();
        assert_eq!(peers.requests.load(Ordering::SeqCst), served);

        chain.fetcher().unwrap().shutdown();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_unknown_block_is_not_found_after_attempts() {
        let net = TestNetwork::new(3, 2);
        let (chain, b0) = net.chain_with_genesis();
        let peers = Arc::new(MockPeers::default());
        let task = chain.spawn_fetcher(config(), peers.clone(), None);

        let unknown = net.block_with_seed(1, &b0, 99);
        let err = chain
            .fetch_block(&Context::background(), unknown.hash, 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(peers.requests.load(Ordering::SeqCst) >= 1);
        assert!(!chain.has_block(&unknown.hash));

        chain.fetcher().unwrap().shutdown();
        task.await.unwrap();
    }
}
