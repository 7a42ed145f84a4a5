use crate::domain::{Hash, StateError};

/// Trie database abstraction: encoded nodes keyed by their hash.
pub trait TrieDatabase: Send + Sync {
    fn get_node(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StateError>;
    fn put_node(&self, hash: Hash, data: Vec<u8>) -> Result<(), StateError>;
    fn batch_put(&self, nodes: Vec<(Hash, Vec<u8>)>) -> Result<(), StateError>;
    fn delete_node(&self, hash: &Hash) -> Result<(), StateError>;

    /// Every stored hash. Used by the prune sweep.
    fn node_hashes(&self) -> Result<Vec<Hash>, StateError>;

    fn contains(&self, hash: &Hash) -> Result<bool, StateError> {
        Ok(self.get_node(hash)?.is_some())
    }
}
