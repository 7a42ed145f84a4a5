//! # LC-04 Block Fetcher
//!
//! Retrieves blocks this node is missing, by hash.
//!
//! ## Flow
//!
//! ```text
//!  fetch(hash) ──┐                           ┌──► miners (notarized)
//!  fetch(hash) ──┼─► dedup map ─► attempt ───┤        │ miss
//!  request(h)  ──┘   (waiters)      task     │        ▼
//!                        ▲                   └──► sharders by score
//!                        │                          (finalized)
//!                        └── completion handler ◄──┘
//! ```
//!
//! - Concurrent requests for one hash share a single attempt; every waiter
//!   receives the same result.
//! - Blocks at or below the round of the latest LFB ticket live on sharders,
//!   so they skip the miner phase. Blocks above it are never asked of
//!   sharders.
//! - Sharders are tried in score order for the block, the ticket issuer
//!   first when one is named. Each hash has a budget of peer attempts.
//! - Miner and sharder attempts are limited by separate semaphores; a full
//!   in-flight map answers `Backpressure`.
//! - The coordinator integrates fetched blocks through
//!   [`FetchCompletionHandler`] before waiters are answered. The fetcher
//!   never holds coordinator locks.

#![warn(clippy::all)]

pub mod attempt;
pub mod domain;
pub mod ports;
pub mod service;

pub use domain::{FetchError, FetchQueueStats, FetchRequest, FetchResult, FetcherConfig};
pub use ports::{BlockSource, FetchCompletionHandler, FetchTargets};
pub use service::{BlockFetcher, BlockFetcherHandle};
