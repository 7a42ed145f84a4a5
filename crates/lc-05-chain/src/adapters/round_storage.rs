use crate::error::ChainResult;
use crate::ports::RoundStorage;
use parking_lot::RwLock;
use shared_types::RoundNumber;
use std::collections::BTreeMap;

/// Per-round values kept in memory, for caches that retention trims.
#[derive(Debug)]
pub struct InMemoryRoundStorage<T> {
    name: String,
    entries: RwLock<BTreeMap<RoundNumber, T>>,
}

impl<T: Clone + Send + Sync> InMemoryRoundStorage<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn put(&self, round: RoundNumber, value: T) {
        self.entries.write().insert(round, value);
    }

    pub fn get(&self, round: RoundNumber) -> Option<T> {
        self.entries.read().get(&round).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl<T: Clone + Send + Sync> RoundStorage for InMemoryRoundStorage<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn rounds(&self) -> Vec<RoundNumber> {
        self.entries.read().keys().copied().collect()
    }

    fn prune_below(&self, round: RoundNumber) -> ChainResult<()> {
        let mut entries = self.entries.write();
        let kept = entries.split_off(&round);
        *entries = kept;
        Ok(())
    }
}
