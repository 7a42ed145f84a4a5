//! # Devnet Genesis
//!
//! Deterministic keys and the initial magic block for a single-process
//! network, plus chain initialization: on restart, reload the persisted
//! genesis block, magic blocks and LFB; otherwise generate and install a
//! fresh genesis block.

use crate::config::{DevnetConfig, NodeRole};
use anyhow::{Context as _, Result};
use lc_05_chain::{Chain, EntityStoreMagicBlockSaver};
use shared_crypto::{keypair_from_seed, SigningKeyPair};
use shared_types::{short_hex, Block, MagicBlock, Node, NodeId, NodePool, NodeType, ZERO_HASH};
use std::sync::Arc;
use tracing::info;

const MINER_SEED_TAG: u8 = 0x4d;
const SHARDER_SEED_TAG: u8 = 0x53;
const MINER_BASE_PORT: u16 = 7100;
const SHARDER_BASE_PORT: u16 = 7200;

/// Signing keys of every devnet node, derived from fixed seeds.
pub struct DevnetKeys {
    miners: Vec<Arc<dyn SigningKeyPair>>,
    sharders: Vec<Arc<dyn SigningKeyPair>>,
}

impl DevnetKeys {
    pub fn derive(devnet: &DevnetConfig, scheme: &str) -> Result<Self> {
        let derive = |tag: u8, count: usize| -> Result<Vec<Arc<dyn SigningKeyPair>>> {
            (0..count)
                .map(|i| {
                    let mut seed = [tag; 32];
                    seed[31] = i as u8;
                    keypair_from_seed(scheme, seed)
                        .map(Arc::from)
                        .with_context(|| format!("deriving {scheme} key {i}"))
                })
                .collect()
        };
        Ok(Self {
            miners: derive(MINER_SEED_TAG, devnet.miners)?,
            sharders: derive(SHARDER_SEED_TAG, devnet.sharders)?,
        })
    }

    pub fn miner_pool(&self) -> NodePool {
        pool(NodeType::Miner, &self.miners, MINER_BASE_PORT)
    }

    pub fn sharder_pool(&self) -> NodePool {
        pool(NodeType::Sharder, &self.sharders, SHARDER_BASE_PORT)
    }

    /// Magic block number 1, governing from round 0.
    pub fn genesis_magic_block(&self) -> MagicBlock {
        MagicBlock::new(1, 0, ZERO_HASH, self.miner_pool(), self.sharder_pool())
    }

    /// Key of the node this process runs as.
    pub fn own_key(&self, devnet: &DevnetConfig) -> Option<Arc<dyn SigningKeyPair>> {
        let keys = match devnet.role {
            NodeRole::Miner => &self.miners,
            NodeRole::Sharder => &self.sharders,
        };
        keys.get(devnet.node_index).cloned()
    }

    pub fn own_id(&self, devnet: &DevnetConfig) -> Option<NodeId> {
        self.own_key(devnet)
            .map(|key| NodeId::from_public_key(&key.public_key_bytes()))
    }

    /// Only sharders sign LFB tickets.
    pub fn ticket_signer(&self, devnet: &DevnetConfig) -> Option<Arc<dyn SigningKeyPair>> {
        match devnet.role {
            NodeRole::Sharder => self.own_key(devnet),
            NodeRole::Miner => None,
        }
    }
}

fn pool(node_type: NodeType, keys: &[Arc<dyn SigningKeyPair>], base_port: u16) -> NodePool {
    let nodes = keys
        .iter()
        .enumerate()
        .map(|(i, key)| Node::new(node_type, key.public_key_bytes(), "127.0.0.1", base_port + i as u16))
        .collect();
    NodePool::from_nodes(node_type, nodes)
}

/// Install genesis on `chain` and return the LFB.
///
/// A persisted genesis block means a restart: the saved magic blocks and the
/// persisted LFB are restored on top of it. Otherwise a fresh genesis block
/// is generated.
pub fn initialize(
    chain: &Chain,
    devnet: &DevnetConfig,
    keys: &DevnetKeys,
    saved: &EntityStoreMagicBlockSaver,
) -> Result<Arc<Block>> {
    if let Some(block) = chain.load_genesis_block().context("loading genesis block")? {
        let genesis = chain
            .add_genesis_block(block)
            .context("installing persisted genesis block")?;
        info!(hash = %short_hex(&genesis.hash), "Genesis block reloaded");
        return restore(chain, saved, genesis);
    }

    let (_, block) = chain
        .generate_genesis_block(&devnet.chain_id, keys.genesis_magic_block())
        .context("generating genesis block")?;
    let genesis = chain.add_genesis_block(block).context("installing genesis block")?;
    info!(
        hash = %short_hex(&genesis.hash),
        miners = devnet.miners,
        sharders = devnet.sharders,
        "Genesis block created"
    );
    Ok(genesis)
}

fn restore(chain: &Chain, saved: &EntityStoreMagicBlockSaver, genesis: Arc<Block>) -> Result<Arc<Block>> {
    for mb in saved.load_all().context("loading saved magic blocks")? {
        let number = mb.magic_block_number;
        chain
            .update_magic_block(mb)
            .with_context(|| format!("restoring magic block {number}"))?;
    }

    let Some((lfb, lfmb)) = chain.load_finalized_blocks().context("loading finalized blocks")? else {
        return Ok(genesis);
    };
    let lfb = chain
        .add_loaded_finalized_blocks(lfb, lfmb)
        .context("restoring latest finalized block")?;
    info!(
        round = lfb.round,
        hash = %short_hex(&lfb.hash),
        magic_blocks = chain.magic_block_count(),
        "Finalized chain restored"
    );
    Ok(lfb)
}
