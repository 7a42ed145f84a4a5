//! # Shared Bus - Chain Event Bus
//!
//! Broadcast channel for notifications the chain emits as it advances:
//! finalized blocks and rounds, view changes, magic block activation, round
//! timeouts, fetched blocks and pruning.
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │ Chain        │                    │ Runtime /    │
//! │ coordinator  │    emit()          │ operators    │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! Events are observations only. The finalized-block and finalized-round
//! queues that consumers must not miss are bounded mpsc channels owned by
//! the chain, not this bus.

#![warn(clippy::all)]

pub mod events;
pub mod publisher;
pub mod subscriber;

pub use events::{ChainEvent, EventFilter, EventTopic};
pub use publisher::{EventPublisher, InMemoryEventBus};
pub use subscriber::{Subscription, SubscriptionError};

/// Events buffered per subscription before it lags.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;
