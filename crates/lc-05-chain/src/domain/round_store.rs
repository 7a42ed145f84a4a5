use super::round::Round;
use shared_types::RoundNumber;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Rounds keyed by number.
#[derive(Debug, Default)]
pub struct RoundStore {
    rounds: BTreeMap<RoundNumber, Arc<Round>>,
}

impl RoundStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the number is taken. Returns the stored round and
    /// whether it was added.
    pub fn add(&mut self, round: Round) -> (Arc<Round>, bool) {
        if let Some(existing) = self.rounds.get(&round.number()) {
            return (existing.clone(), false);
        }
        let round = Arc::new(round);
        self.rounds.insert(round.number(), round.clone());
        (round, true)
    }

    pub fn get(&self, number: RoundNumber) -> Option<Arc<Round>> {
        self.rounds.get(&number).cloned()
    }

    pub fn remove(&mut self, number: RoundNumber) -> Option<Arc<Round>> {
        self.rounds.remove(&number)
    }

    /// Drop rounds strictly below `number`.
    pub fn delete_below(&mut self, number: RoundNumber) -> usize {
        let kept = self.rounds.split_off(&number);
        let removed = self.rounds.len();
        self.rounds = kept;
        removed
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    pub fn latest(&self) -> Option<Arc<Round>> {
        self.rounds.values().next_back().cloned()
    }

    pub fn numbers(&self) -> Vec<RoundNumber> {
        self.rounds.keys().copied().collect()
    }
}
