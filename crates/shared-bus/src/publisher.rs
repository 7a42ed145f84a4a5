//! Publishing side of the chain event bus.

use crate::events::{ChainEvent, EventFilter};
use crate::subscriber::Subscription;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// Anything chain events can be published to.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Returns how many subscriptions the event was delivered to.
    async fn publish(&self, event: ChainEvent) -> usize;

    /// Events published since creation, delivered or not.
    fn events_published(&self) -> u64;
}

/// Process-local bus over a `tokio` broadcast channel.
///
/// Publishing never blocks. A subscription that falls more than `capacity`
/// events behind skips ahead and loses the oldest ones.
pub struct InMemoryEventBus {
    sender: broadcast::Sender<ChainEvent>,

    events_published: AtomicU64,

    capacity: usize,
}

impl InMemoryEventBus {
    /// Bus buffering [`DEFAULT_CHANNEL_CAPACITY`] events per subscription.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            events_published: AtomicU64::new(0),
            capacity,
        }
    }

    /// Start receiving events accepted by `filter`. Only events emitted after
    /// this call are seen.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        debug!(topics = ?filter.topics, subscribers = self.sender.receiver_count() + 1, "Bus subscription added");
        Subscription::new(self.sender.subscribe(), filter)
    }

    /// Synchronous publish, usable while holding a lock.
    pub fn emit(&self, event: ChainEvent) -> usize {
        self.events_published.fetch_add(1, Ordering::Relaxed);
        let topic = event.topic();

        match self.sender.send(event) {
            Ok(delivered) => {
                trace!(?topic, delivered, "Chain event emitted");
                delivered
            }
            // Nobody listening.
            Err(_) => 0,
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventPublisher for InMemoryEventBus {
    async fn publish(&self, event: ChainEvent) -> usize {
        self.emit(event)
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}
