//! # Chain Entities
//!
//! Blocks, transactions and notarization proofs.
//!
//! A block references its predecessor by hash, its round by number and the
//! magic block that governs it by hash. Nothing here holds a pointer to
//! another entity; the chain stores resolve identities on lookup.

use crate::errors::{EntityError, EntityResult};
use crate::membership::MagicBlock;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, Bytes};
use sha2::{Digest, Sha256};
use std::fmt;

// =============================================================================
// PRIMITIVES
// =============================================================================

/// A 32-byte SHA-256 digest.
pub type Hash = [u8; 32];

/// Round number. Genesis is round 0.
pub type RoundNumber = u64;

/// The all-zero hash.
pub const ZERO_HASH: Hash = [0u8; 32];

/// SHA-256 of arbitrary bytes.
pub fn hash_bytes(data: &[u8]) -> Hash {
    Sha256::digest(data).into()
}

/// Full lowercase hex of a hash.
pub fn to_hex(hash: &Hash) -> String {
    hex::encode(hash)
}

/// First 8 hex characters, for log fields.
pub fn short_hex(hash: &Hash) -> String {
    hex::encode(&hash[..4])
}

/// Parse a 64-character hex string into a hash.
pub fn from_hex(value: &str) -> EntityResult<Hash> {
    let bytes = hex::decode(value).map_err(|e| EntityError::InvalidHex(e.to_string()))?;
    let actual = bytes.len();
    bytes
        .try_into()
        .map_err(|_| EntityError::InvalidLength {
            expected: 32,
            actual,
        })
}

/// Unique identifier of a node: SHA-256 of its public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
pub struct NodeId(pub [u8; 32]);

impl NodeId {
    /// Derive the identifier from a public key.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        Self(hash_bytes(public_key))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", short_hex(&self.0))
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", short_hex(&self.0))
    }
}

// =============================================================================
// CLUSTER A: TRANSACTIONS
// =============================================================================

/// A client transaction as included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Content hash over all other fields.
    pub hash: Hash,
    /// Submitting client.
    pub client_id: NodeId,
    /// Opaque payload.
    pub data: Vec<u8>,
    /// Fee paid, in base units.
    pub fee: u64,
    /// Unix seconds at creation.
    pub creation_date: u64,
}

impl Transaction {
    /// Build a transaction and compute its hash.
    pub fn new(client_id: NodeId, data: Vec<u8>, fee: u64, creation_date: u64) -> Self {
        let mut txn = Self {
            hash: ZERO_HASH,
            client_id,
            data,
            fee,
            creation_date,
        };
        txn.hash = txn.compute_hash();
        txn
    }

    /// Recompute the content hash.
    pub fn compute_hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.client_id.0);
        hasher.update(self.fee.to_le_bytes());
        hasher.update(self.creation_date.to_le_bytes());
        hasher.update(&self.data);
        hasher.finalize().into()
    }
}

// =============================================================================
// CLUSTER B: NOTARIZATION
// =============================================================================

/// One miner's signature over a block hash.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationTicket {
    /// Signing miner.
    pub verifier_id: NodeId,
    /// Signature over the block hash, in the chain's configured scheme.
    #[serde_as(as = "Bytes")]
    pub signature: Vec<u8>,
}

/// Proof that enough miners endorsed a block within its round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NotarizationProof {
    pub tickets: Vec<VerificationTicket>,
}

impl NotarizationProof {
    pub fn new(tickets: Vec<VerificationTicket>) -> Self {
        Self { tickets }
    }

    /// Number of distinct verifiers. Duplicate tickets count once.
    pub fn unique_verifiers(&self) -> usize {
        let mut ids: Vec<&NodeId> = self.tickets.iter().map(|t| &t.verifier_id).collect();
        ids.sort();
        ids.dedup();
        ids.len()
    }
}

// =============================================================================
// CLUSTER C: BLOCKS
// =============================================================================

/// A block as stored by the chain.
///
/// `hash` covers every field except `hash` itself and `notarization`; the
/// proof is attached after the fact and never changes block identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Content hash of the header fields.
    pub hash: Hash,
    /// Round this block was generated for.
    pub round: RoundNumber,
    /// Predecessor hash. `None` only for genesis.
    pub prev_hash: Option<Hash>,
    /// Chain identity anchored by the genesis header.
    pub chain_id: Hash,
    /// Root of the state trie after applying this block.
    pub state_root: Hash,
    /// Generating miner.
    pub miner_id: NodeId,
    /// Random seed of the round the block was generated in.
    pub round_random_seed: u64,
    /// Timeout count of the round when the block was generated.
    pub round_timeout_count: u32,
    /// Unix seconds at generation.
    pub creation_date: u64,
    /// Included transactions.
    pub transactions: Vec<Transaction>,
    /// Hash of the magic block governing this block's round.
    pub latest_finalized_magic_block_hash: Hash,
    /// Membership snapshot carried by view-change blocks.
    pub magic_block: Option<MagicBlock>,
    /// Notarization proof, once gathered.
    pub notarization: Option<NotarizationProof>,
}

impl Block {
    /// Start building a block for a round.
    pub fn builder(round: RoundNumber) -> BlockBuilder {
        BlockBuilder::new(round)
    }

    /// SHA-256 over the concatenated transaction hashes.
    pub fn transactions_root(&self) -> Hash {
        let mut hasher = Sha256::new();
        for txn in &self.transactions {
            hasher.update(txn.hash);
        }
        hasher.finalize().into()
    }

    /// Recompute the content hash from the header fields.
    pub fn compute_hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(b"block:v1");
        hasher.update(self.round.to_le_bytes());
        match &self.prev_hash {
            Some(prev) => {
                hasher.update([1u8]);
                hasher.update(prev);
            }
            None => hasher.update([0u8]),
        }
        hasher.update(self.chain_id);
        hasher.update(self.state_root);
        hasher.update(self.miner_id.0);
        hasher.update(self.round_random_seed.to_le_bytes());
        hasher.update(self.round_timeout_count.to_le_bytes());
        hasher.update(self.creation_date.to_le_bytes());
        hasher.update(self.transactions_root());
        hasher.update(self.latest_finalized_magic_block_hash);
        match &self.magic_block {
            Some(mb) => {
                hasher.update([1u8]);
                hasher.update(mb.hash);
            }
            None => hasher.update([0u8]),
        }
        hasher.finalize().into()
    }

    /// True when the stored hash matches the header.
    pub fn verify_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Error variant of [`Block::verify_hash`].
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

    /// Whether a transaction with this hash is included.
    pub fn contains_transaction(&self, txn_hash: &Hash) -> bool {
        self.transactions.iter().any(|t| &t.hash == txn_hash)
    }

    pub fn is_genesis(&self) -> bool {
        self.round == 0 && self.prev_hash.is_none()
    }

    /// Attach or replace the notarization proof. Identity is unchanged.
    pub fn with_notarization(mut self, proof: NotarizationProof) -> Self {
        self.notarization = Some(proof);
        self
    }
}

/// Builder for [`Block`]. `build()` seals the hash.
#[derive(Debug, Clone)]
pub struct BlockBuilder {
    block: Block,
}

impl BlockBuilder {
    pub fn new(round: RoundNumber) -> Self {
        Self {
            block: Block {
                hash: ZERO_HASH,
                round,
                prev_hash: None,
                chain_id: ZERO_HASH,
                state_root: ZERO_HASH,
                miner_id: NodeId::default(),
                round_random_seed: 0,
                round_timeout_count: 0,
                creation_date: 0,
                transactions: Vec::new(),
                latest_finalized_magic_block_hash: ZERO_HASH,
                magic_block: None,
                notarization: None,
            },
        }
    }

    pub fn prev_hash(mut self, prev: Hash) -> Self {
        self.block.prev_hash = Some(prev);
        self
    }

    pub fn chain_id(mut self, chain_id: Hash) -> Self {
        self.block.chain_id = chain_id;
        self
    }

    pub fn state_root(mut self, root: Hash) -> Self {
        self.block.state_root = root;
        self
    }

    pub fn miner(mut self, miner_id: NodeId) -> Self {
        self.block.miner_id = miner_id;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.block.round_random_seed = seed;
        self
    }

    pub fn timeout_count(mut self, count: u32) -> Self {
        self.block.round_timeout_count = count;
        self
    }

    pub fn creation_date(mut self, secs: u64) -> Self {
        self.block.creation_date = secs;
        self
    }

    pub fn transactions(mut self, txns: Vec<Transaction>) -> Self {
        self.block.transactions = txns;
        self
    }

    pub fn latest_finalized_magic_block_hash(mut self, hash: Hash) -> Self {
        self.block.latest_finalized_magic_block_hash = hash;
        self
    }

    pub fn magic_block(mut self, mb: MagicBlock) -> Self {
        self.block.magic_block = Some(mb);
        self
    }

    pub fn notarization(mut self, proof: NotarizationProof) -> Self {
        self.block.notarization = Some(proof);
        self
    }

    /// Seal the hash and return the block.
    pub fn build(mut self) -> Block {
        self.block.hash = self.block.compute_hash();
        self.block
    }
}
