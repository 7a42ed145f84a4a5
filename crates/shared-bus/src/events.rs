//! # Chain Events
//!
//! Notifications emitted by the chain subsystem. Consumers observe them; no
//! event carries a command, so dropping one never changes chain state.

use serde::{Deserialize, Serialize};
use shared_types::entities::{Hash, RoundNumber};

/// All events that can be published to the event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    // =========================================================================
    // FINALIZATION
    // =========================================================================
    /// A block became the latest finalized block.
    BlockFinalized {
        round: RoundNumber,
        block_hash: Hash,
    },

    /// A round reached its terminal state.
    RoundFinalized { round: RoundNumber },

    /// Genesis block was installed.
    GenesisInitialized { block_hash: Hash },

    // =========================================================================
    // MEMBERSHIP
    // =========================================================================
    /// A finalized block carried a new magic block and it was stored.
    ViewChangeApplied {
        magic_block_number: u64,
        starting_round: RoundNumber,
        magic_block_hash: Hash,
    },

    /// The current round crossed a stored magic block's starting round.
    MagicBlockActivated {
        magic_block_number: u64,
        starting_round: RoundNumber,
    },

    // =========================================================================
    // ROUNDS
    // =========================================================================
    /// The generator timeout fired before the round was notarized.
    RoundTimedOut {
        round: RoundNumber,
        timeout_count: u32,
    },

    // =========================================================================
    // FETCH / STATE
    // =========================================================================
    /// A missing block arrived through the fetcher.
    BlockFetched { hash: Hash, round: RoundNumber },

    /// State trie pruning finished.
    StatePruned { round: RoundNumber, deleted: u64 },
}

impl ChainEvent {
    /// Topic used for filtering.
    #[must_use]
    pub fn topic(&self) -> EventTopic {
        match self {
            Self::BlockFinalized { .. } | Self::GenesisInitialized { .. } => EventTopic::Blocks,
            Self::RoundFinalized { .. } | Self::RoundTimedOut { .. } => EventTopic::Rounds,
            Self::ViewChangeApplied { .. } | Self::MagicBlockActivated { .. } => {
                EventTopic::Membership
            }
            Self::BlockFetched { .. } => EventTopic::Fetch,
            Self::StatePruned { .. } => EventTopic::State,
        }
    }

    /// Round the event concerns, if any.
    #[must_use]
    pub fn round(&self) -> Option<RoundNumber> {
        match self {
            Self::BlockFinalized { round, .. }
            | Self::RoundFinalized { round }
            | Self::RoundTimedOut { round, .. }
            | Self::BlockFetched { round, .. }
            | Self::StatePruned { round, .. } => Some(*round),
            Self::MagicBlockActivated { starting_round, .. }
            | Self::ViewChangeApplied { starting_round, .. } => Some(*starting_round),
            Self::GenesisInitialized { .. } => Some(0),
        }
    }
}

/// Event topics for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventTopic {
    /// Block finalization and genesis.
    Blocks,
    /// Round lifecycle.
    Rounds,
    /// View changes and magic block activation.
    Membership,
    /// State trie maintenance.
    State,
    /// Block fetcher results.
    Fetch,
    /// All events (no filtering).
    All,
}

/// Filter for subscribing to specific events.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Topics to include. Empty means all topics.
    pub topics: Vec<EventTopic>,
}

impl EventFilter {
    /// Create a filter that accepts all events.
    #[must_use]
    pub fn all() -> Self {
        Self::default()
    }

    /// Create a filter for specific topics.
    #[must_use]
    pub fn topics(topics: Vec<EventTopic>) -> Self {
        Self { topics }
    }

    /// Check if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &ChainEvent) -> bool {
        self.topics.is_empty()
            || self.topics.contains(&EventTopic::All)
            || self.topics.contains(&event.topic())
    }
}
