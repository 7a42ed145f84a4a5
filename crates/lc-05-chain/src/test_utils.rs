//! Fixtures for building small keyed networks in tests.
//!
//! Keys are derived from fixed seeds so every run produces the same node ids
//! and block hashes.

use crate::config::ChainConfig;
use crate::service::{Chain, ChainDependencies};
use shared_crypto::{Ed25519KeyPair, SigningKeyPair};
use shared_types::{
    Block, BlockBuilder, Hash, MagicBlock, Node, NodeId, NodePool, NodeType, NotarizationProof, RoundNumber,
    VerificationTicket, ZERO_HASH,
};
use std::sync::Arc;

/// Chain id used by [`TestNetwork::chain_with_genesis`].
pub const TEST_CHAIN_ID: &str = "0afc093ffb509f059c55478bc1a60351cef7b4e9c008a53a6cc8241ca8617dfe";

/// Miners and sharders with known signing keys.
pub struct TestNetwork {
    miner_keys: Vec<Ed25519KeyPair>,
    sharder_keys: Vec<Ed25519KeyPair>,
}

impl TestNetwork {
    pub fn new(miners: usize, sharders: usize) -> Self {
        let key = |tag: u8, i: usize| {
            let mut seed = [tag; 32];
            seed[31] = i as u8;
            Ed25519KeyPair::from_seed(seed)
        };
        Self {
            miner_keys: (0..miners).map(|i| key(0x4d, i)).collect(),
            sharder_keys: (0..sharders).map(|i| key(0x53, i)).collect(),
        }
    }

    pub fn miner_key(&self, index: usize) -> &Ed25519KeyPair {
        &self.miner_keys[index]
    }

    pub fn miner_id(&self, index: usize) -> NodeId {
        NodeId::from_public_key(&self.miner_keys[index].public_key_bytes())
    }

    pub fn miner_pool(&self) -> NodePool {
        pool(NodeType::Miner, &self.miner_keys, 7100)
    }

    pub fn sharder_pool(&self) -> NodePool {
        pool(NodeType::Sharder, &self.sharder_keys, 7200)
    }

    pub fn magic_block(&self, number: u64, starting_round: RoundNumber, previous_hash: Hash) -> MagicBlock {
        MagicBlock::new(
            number,
            starting_round,
            previous_hash,
            self.miner_pool(),
            self.sharder_pool(),
        )
    }

    /// Magic block number 1 governing from round 0.
    pub fn genesis_magic_block(&self) -> MagicBlock {
        self.magic_block(1, 0, ZERO_HASH)
    }

    pub fn chain(&self) -> Arc<Chain> {
        self.chain_with_config(ChainConfig::default())
    }

    pub fn chain_with_config(&self, config: ChainConfig) -> Arc<Chain> {
        let chain = Chain::new(config, ChainDependencies::in_memory()).expect("test config is valid");
        Arc::new(chain)
    }

    /// A chain with genesis installed, and the genesis block.
    pub fn chain_with_genesis(&self) -> (Arc<Chain>, Arc<Block>) {
        self.chain_with_genesis_config(ChainConfig::default())
    }

    pub fn chain_with_genesis_config(&self, config: ChainConfig) -> (Arc<Chain>, Arc<Block>) {
        let chain = self.chain_with_config(config);
        let (_, genesis) = chain
            .generate_genesis_block(TEST_CHAIN_ID, self.genesis_magic_block())
            .expect("genesis");
        let genesis = chain.add_genesis_block(genesis).expect("install genesis");
        (chain, genesis)
    }

    /// Builder for a child of `prev`, generated by miner `round % miners`.
    pub fn builder(&self, round: RoundNumber, prev: &Block, seed: u64) -> BlockBuilder {
        let miner = self.miner_id(round as usize % self.miner_keys.len().max(1));
        Block::builder(round)
            .prev_hash(prev.hash)
            .chain_id(prev.chain_id)
            .state_root(prev.state_root)
            .miner(miner)
            .random_seed(seed)
            .creation_date(prev.creation_date + 1)
            .latest_finalized_magic_block_hash(prev.latest_finalized_magic_block_hash)
    }

    pub fn block_with_seed(&self, round: RoundNumber, prev: &Block, seed: u64) -> Block {
        self.builder(round, prev, seed).build()
    }

    /// Attach a proof signed by the first `signers` miners.
    pub fn notarize(&self, block: Block, signers: usize) -> Block {
        let tickets = self
            .miner_keys
            .iter()
            .take(signers)
            .map(|key| ticket(key, &block.hash))
            .collect();
        block.with_notarization(NotarizationProof::new(tickets))
    }
}

/// A verification ticket for `hash` signed by `key`.
pub fn ticket(key: &dyn SigningKeyPair, hash: &Hash) -> VerificationTicket {
    VerificationTicket {
        verifier_id: NodeId::from_public_key(&key.public_key_bytes()),
        signature: key.sign(hash),
    }
}

fn pool(node_type: NodeType, keys: &[Ed25519KeyPair], base_port: u16) -> NodePool {
    let nodes = keys
        .iter()
        .enumerate()
        .map(|(i, key)| Node::new(node_type, key.public_key_bytes(), "127.0.0.1", base_port + i as u16))
        .collect();
    NodePool::from_nodes(node_type, nodes)
}
