//! # Ledger-Chain Benchmarks
//!
//! | Group | Operation |
//! |-------|-----------|
//! | lc-01 scoring | sharder scoring and miner permutation per pool size |
//! | lc-02 trie | batched state updates, point reads |
//! | lc-05 blocks | notarized block insertion with finalization |

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use lc_01_node_pool::{miner_permutation, score_nodes, HashPoolScorer, PoolScorer};
use lc_02_state_trie::{InMemoryTrieDb, StateTrie, EMPTY_ROOT};
use lc_05_chain::test_utils::TestNetwork;
use rand::Rng;
use shared_types::{hash_bytes, Block, Node, NodePool, NodeType};
use std::sync::Arc;
use std::time::Duration;

fn random_pool(size: usize) -> NodePool {
    let mut rng = rand::thread_rng();
    let nodes = (0..size)
        .map(|i| {
            let key: [u8; 32] = rng.gen();
            Node::new(NodeType::Sharder, key.to_vec(), "127.0.0.1", 7200 + i as u16)
        })
        .collect();
    NodePool::from_nodes(NodeType::Sharder, nodes)
}

// ============================================================================
// LC-01: Node pool scoring
// ============================================================================

fn bench_scoring(c: &mut Criterion) {
    let mut group = c.benchmark_group("lc-01-scoring");

    for size in [10usize, 100, 1_000] {
        let pool = random_pool(size);
        let key = hash_bytes(b"block");

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("score_nodes", size), &pool, |b, pool| {
            b.iter(|| black_box(score_nodes(pool.nodes(), &key)))
        });
        group.bench_with_input(BenchmarkId::new("hash_scorer", size), &pool, |b, pool| {
            b.iter(|| black_box(HashPoolScorer.score_hash(pool, &key)))
        });
        group.bench_with_input(BenchmarkId::new("miner_permutation", size), &size, |b, &size| {
            b.iter(|| black_box(miner_permutation(black_box(839_695_260), size)))
        });
    }

    group.finish();
}

// ============================================================================
// LC-02: State trie
// ============================================================================

fn bench_trie(c: &mut Criterion) {
    let mut group = c.benchmark_group("lc-02-trie");
    group.measurement_time(Duration::from_secs(10));

    for batch in [10usize, 100, 1_000] {
        let mut rng = rand::thread_rng();
        let changes: Vec<(Vec<u8>, Option<Vec<u8>>)> = (0..batch)
            .map(|_| {
                let key: [u8; 32] = rng.gen();
                let value: [u8; 64] = [rng.gen(); 64];
                (key.to_vec(), Some(value.to_vec()))
            })
            .collect();

        group.throughput(Throughput::Elements(batch as u64));
        group.bench_with_input(BenchmarkId::new("apply", batch), &changes, |b, changes| {
            b.iter_batched(
                || (StateTrie::new(Arc::new(InMemoryTrieDb::new())), changes.clone()),
                |(trie, changes)| black_box(trie.apply(&EMPTY_ROOT, changes).ok()),
                BatchSize::SmallInput,
            )
        });
    }

    let trie = StateTrie::new(Arc::new(InMemoryTrieDb::new()));
    let keys: Vec<Vec<u8>> = (0..1_000u32).map(|i| hash_bytes(&i.to_be_bytes()).to_vec()).collect();
    let changes = keys.iter().map(|k| (k.clone(), Some(k.clone()))).collect();
    if let Ok(root) = trie.apply(&EMPTY_ROOT, changes) {
        group.bench_function("get_1000_keys", |b| {
            let mut i = 0usize;
            b.iter(|| {
                i = (i + 1) % keys.len();
                black_box(trie.get(&root, &keys[i]).ok())
            })
        });
    }

    group.finish();
}

// ============================================================================
// LC-05: Block insertion
// ============================================================================

fn bench_block_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("lc-05-blocks");
    let net = TestNetwork::new(4, 2);

    for rounds in [10u64, 100] {
        let (_, genesis) = net.chain_with_genesis();
        let mut prev = genesis;
        let mut blocks: Vec<Block> = Vec::new();
        for round in 1..=rounds {
            let block = net.notarize(net.block_with_seed(round, &prev, round * 7), 3);
            prev = Arc::new(block.clone());
            blocks.push(block);
        }

        group.throughput(Throughput::Elements(rounds));
        group.bench_with_input(BenchmarkId::new("add_and_finalize", rounds), &blocks, |b, blocks| {
            b.iter_batched(
                || (net.chain_with_genesis().0, blocks.clone()),
                |(chain, blocks)| {
                    for block in blocks {
                        let _ = black_box(chain.add_block(block));
                    }
                    black_box(chain.latest_finalized_block())
                },
                BatchSize::LargeInput,
            )
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scoring, bench_trie, bench_block_insertion);
criterion_main!(benches);
