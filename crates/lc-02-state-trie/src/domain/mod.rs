pub mod errors;
pub mod nibbles;
pub mod node;
pub mod stats;
pub mod trie;

pub use errors::{StateError, StateResult};
pub use nibbles::Nibbles;
pub use node::{node_hash, TrieNode};
pub use stats::PruneStats;
pub use trie::StateTrie;

pub use shared_types::Hash;

/// Root of the empty trie. No node is stored for it.
pub const EMPTY_ROOT: Hash = shared_types::ZERO_HASH;
