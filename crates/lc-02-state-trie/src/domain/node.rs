use super::{nibbles::Nibbles, Hash, StateError};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

// =============================================================================
// TRIE NODE: The three stored node types
// =============================================================================

/// A stored trie node. The empty trie has no node; its root is
/// [`super::EMPTY_ROOT`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrieNode {
    /// Remaining key path and the value.
    Leaf { path: Nibbles, value: Vec<u8> },

    /// Shared prefix with a single child.
    Extension { path: Nibbles, child: Hash },

    /// 16-way branch, plus a value for a key ending here.
    Branch {
        children: Box<[Option<Hash>; 16]>,
        value: Option<Vec<u8>>,
    },
}

impl TrieNode {
    /// Branch with no children and no value.
    pub fn empty_branch() -> Self {
        TrieNode::Branch {
            children: Box::new([None; 16]),
            value: None,
        }
    }

    /// Canonical encoding; the node hash is taken over these bytes.
    pub fn encode(&self) -> Result<Vec<u8>, StateError> {
        bincode::serialize(self).map_err(|e| StateError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, StateError> {
        bincode::deserialize(bytes).map_err(|e| StateError::Serialization(e.to_string()))
    }

    /// Hashes of directly referenced children.
    pub fn child_hashes(&self) -> Vec<Hash> {
        match self {
            TrieNode::Leaf { .. } => Vec::new(),
            TrieNode::Extension { child, .. } => vec![*child],
            TrieNode::Branch { children, .. } => children.iter().flatten().copied().collect(),
        }
    }
}

/// Keccak-256 of encoded node bytes.
pub fn node_hash(encoded: &[u8]) -> Hash {
    Keccak256::digest(encoded).into()
}
