use crate::domain::{Hash, StateError};
use crate::ports::TrieDatabase;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory implementation of TrieDatabase
#[derive(Debug, Default)]
pub struct InMemoryTrieDb {
    nodes: RwLock<HashMap<Hash, Vec<u8>>>,
}

impl InMemoryTrieDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }
}

impl TrieDatabase for InMemoryTrieDb {
    fn get_node(&self, hash: &Hash) -> Result<Option<Vec<u8>>, StateError> {
        Ok(self.nodes.read().get(hash).cloned())
    }

    fn put_node(&self, hash: Hash, data: Vec<u8>) -> Result<(), StateError> {
        self.nodes.write().insert(hash, data);
        Ok(())
    }

    fn batch_put(&self, batch: Vec<(Hash, Vec<u8>)>) -> Result<(), StateError> {
        let mut nodes = self.nodes.write();
        for (hash, data) in batch {
            nodes.insert(hash, data);
        }
        Ok(())
    }

    fn delete_node(&self, hash: &Hash) -> Result<(), StateError> {
        self.nodes.write().remove(hash);
        Ok(())
    }

    fn node_hashes(&self) -> Result<Vec<Hash>, StateError> {
        Ok(self.nodes.read().keys().copied().collect())
    }

    fn contains(&self, hash: &Hash) -> Result<bool, StateError> {
        Ok(self.nodes.read().contains_key(hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trie_db_operations() {
        let db = InMemoryTrieDb::new();
        let hash = [0xAB; 32];
        let data = vec![1, 2, 3, 4];

        db.put_node(hash, data.clone()).unwrap();
        assert_eq!(db.get_node(&hash).unwrap(), Some(data));
        assert_eq!(db.node_hashes().unwrap(), vec![hash]);

        db.delete_node(&hash).unwrap();
        assert_eq!(db.get_node(&hash).unwrap(), None);
        assert!(db.is_empty());
    }
}
