//! # Membership Entities
//!
//! Nodes, node pools and magic blocks.
//!
//! A `MagicBlock` is a frozen membership snapshot: the miner and sharder
//! pools that govern every round from its starting round until the next
//! magic block takes over. Pool membership never changes after publication;
//! only a node's liveness status does, which is why it lives in an atomic
//! outside the serialized fields.

use crate::entities::{Hash, NodeId, RoundNumber, ZERO_HASH};
use crate::errors::{EntityError, EntityResult};
use crate::to_hex;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

// =============================================================================
// NODES
// =============================================================================

/// Role of a node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Miner,
    Sharder,
}

/// Liveness as observed by the local health monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    Active = 0,
    Inactive = 1,
}

impl NodeStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => NodeStatus::Active,
            _ => NodeStatus::Inactive,
        }
    }
}

/// A network participant.
#[serde_as]
#[derive(Debug, Serialize, Deserialize)]
pub struct Node {
    /// SHA-256 of `public_key`.
    pub id: NodeId,
    /// Raw public key in the chain's signature scheme.
    #[serde_as(as = "Bytes")]
    pub public_key: Vec<u8>,
    pub node_type: NodeType,
    /// Position within its pool; drives round-rank permutations.
    pub set_index: usize,
    pub host: String,
    pub port: u16,
    #[serde(skip)]
    status: AtomicU8,
}

impl Node {
    /// New active node; the id is derived from the public key.
    pub fn new(node_type: NodeType, public_key: Vec<u8>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id: NodeId::from_public_key(&public_key),
            public_key,
            node_type,
            set_index: 0,
            host: host.into(),
            port,
            status: AtomicU8::new(NodeStatus::Active as u8),
        }
    }

    pub fn status(&self) -> NodeStatus {
        NodeStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub fn set_status(&self, status: NodeStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.status() == NodeStatus::Active
    }

    /// Same identity and key; used when canonicalising pools.
    pub fn same_identity(&self, other: &Node) -> bool {
        self.id == other.id && self.public_key == other.public_key
    }
}

impl Clone for Node {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            public_key: self.public_key.clone(),
            node_type: self.node_type,
            set_index: self.set_index,
            host: self.host.clone(),
            port: self.port,
            status: AtomicU8::new(self.status.load(Ordering::Acquire)),
        }
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.public_key == other.public_key
            && self.node_type == other.node_type
            && self.set_index == other.set_index
            && self.host == other.host
            && self.port == other.port
    }
}

impl Eq for Node {}

// =============================================================================
// NODE POOLS
// =============================================================================

/// An ordered set of nodes of one type. Order is by `set_index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodePool {
    pool_type: NodeType,
    nodes: Vec<Arc<Node>>,
}

impl NodePool {
    pub fn new(pool_type: NodeType) -> Self {
        Self {
            pool_type,
            nodes: Vec::new(),
        }
    }

    /// Build a pool, assigning set indices in the given order.
    pub fn from_nodes(pool_type: NodeType, nodes: Vec<Node>) -> Self {
        let mut pool = Self::new(pool_type);
        for node in nodes {
            pool.add_node(node);
        }
        pool
    }

    /// Append a node. Returns `false` if a node with the same id exists.
    pub fn add_node(&mut self, mut node: Node) -> bool {
        if self.has_node(&node.id) {
            return false;
        }
        node.set_index = self.nodes.len();
        node.node_type = self.pool_type;
        self.nodes.push(Arc::new(node));
        true
    }

    pub fn pool_type(&self) -> NodeType {
        self.pool_type
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[Arc<Node>] {
        &self.nodes
    }

    pub fn get_node(&self, id: &NodeId) -> Option<&Arc<Node>> {
        self.nodes.iter().find(|n| &n.id == id)
    }

    pub fn has_node(&self, id: &NodeId) -> bool {
        self.get_node(id).is_some()
    }

    pub fn node_ids(&self) -> Vec<NodeId> {
        self.nodes.iter().map(|n| n.id).collect()
    }

    /// Nodes currently marked active.
    pub fn active_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_active()).count()
    }

    /// Swap every node handle for the one `resolve` returns.
    ///
    /// Used before publication to share liveness state between snapshots
    /// that list the same node.
    pub fn canonicalize(&mut self, mut resolve: impl FnMut(&Arc<Node>) -> Arc<Node>) {
        for slot in self.nodes.iter_mut() {
            let resolved = resolve(slot);
            *slot = resolved;
        }
    }

    fn digest_into(&self, hasher: &mut Sha256) {
        hasher.update((self.nodes.len() as u64).to_le_bytes());
        for node in &self.nodes {
            hasher.update(node.id.0);
            hasher.update(&node.public_key);
        }
    }
}

// =============================================================================
// MAGIC BLOCKS
// =============================================================================

/// A membership snapshot for rounds at or after `starting_round`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicBlock {
    /// Content hash over all other fields.
    pub hash: Hash,
    /// Hash of the predecessor snapshot; zero for the first one.
    pub previous_hash: Hash,
    /// Sequence number; the first snapshot is 1.
    pub magic_block_number: u64,
    /// First round governed by this snapshot.
    pub starting_round: RoundNumber,
    pub miners: NodePool,
    pub sharders: NodePool,
    /// Signers required out of `n`.
    pub t: usize,
    /// Shares required to reconstruct.
    pub k: usize,
    /// Miner count when the snapshot was cut.
    pub n: usize,
}

impl MagicBlock {
    /// Build and seal a snapshot with two-thirds thresholds.
    pub fn new(
        magic_block_number: u64,
        starting_round: RoundNumber,
        previous_hash: Hash,
        miners: NodePool,
        sharders: NodePool,
    ) -> Self {
        let n = miners.size();
        let t = (n * 2 + 2) / 3;
        let mut mb = Self {
            hash: ZERO_HASH,
            previous_hash,
            magic_block_number,
            starting_round,
            miners,
            sharders,
            t,
            k: t,
            n,
        };
        mb.hash = mb.compute_hash();
        mb
    }

    /// Override thresholds and reseal.
    pub fn with_thresholds(mut self, t: usize, k: usize) -> Self {
        self.t = t;
        self.k = k;
        self.hash = self.compute_hash();
        self
    }

    pub fn compute_hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(b"magic-block:v1");
        hasher.update(self.previous_hash);
        hasher.update(self.magic_block_number.to_le_bytes());
        hasher.update(self.starting_round.to_le_bytes());
        self.miners.digest_into(&mut hasher);
        self.sharders.digest_into(&mut hasher);
        hasher.update((self.t as u64).to_le_bytes());
        hasher.update((self.k as u64).to_le_bytes());
        hasher.update((self.n as u64).to_le_bytes());
        hasher.finalize().into()
    }

    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    pub fn ensure_hash(&self) -> EntityResult<()> {
        let computed = self.compute_hash();
        if computed != self.hash {
            return Err(EntityError::HashMismatch {
                stored: to_hex(&self.hash),
                computed: to_hex(&computed),
            });
        }
        Ok(())
    }

    /// Whether the node is a miner or sharder in this snapshot.
    pub fn is_member(&self, id: &NodeId) -> bool {
        self.miners.has_node(id) || self.sharders.has_node(id)
    }
}
