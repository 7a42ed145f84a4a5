use crate::error::ChainResult;
use crate::ports::EntityStore;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-memory implementation of EntityStore
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    entries: RwLock<HashMap<(String, String), Vec<u8>>>,
}

impl InMemoryEntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Keys stored under `namespace`, sorted.
    pub fn keys(&self, namespace: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter(|(ns, _)| ns == namespace)
            .map(|(_, key)| key.clone())
            .collect();
        keys.sort();
        keys
    }
}

impl EntityStore for InMemoryEntityStore {
    fn read(&self, namespace: &str, key: &str) -> ChainResult<Option<Vec<u8>>> {
        Ok(self
            .entries
            .read()
            .get(&(namespace.to_string(), key.to_string()))
            .cloned())
    }

    fn write(&self, namespace: &str, key: &str, value: Vec<u8>) -> ChainResult<()> {
        self.entries
            .write()
            .insert((namespace.to_string(), key.to_string()), value);
        Ok(())
    }

    fn delete(&self, namespace: &str, key: &str) -> ChainResult<()> {
        self.entries
            .write()
            .remove(&(namespace.to_string(), key.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespaces_are_separate() {
        let store = InMemoryEntityStore::new();
        store.write("configdb", "genesis", vec![1]).unwrap();
        store.write("magicdb", "genesis", vec![2]).unwrap();

        assert_eq!(store.read("configdb", "genesis").unwrap(), Some(vec![1]));
        assert_eq!(store.read("magicdb", "genesis").unwrap(), Some(vec![2]));
        assert_eq!(store.keys("configdb"), vec!["genesis".to_string()]);

        store.delete("configdb", "genesis").unwrap();
        assert_eq!(store.read("configdb", "genesis").unwrap(), None);
        assert_eq!(store.len(), 1);
    }
}
