//! # LC-05 Chain
//!
//! Coordinator of a node's view of the ledger: blocks, rounds, magic blocks,
//! finalization and view change.
//!
//! ## Role in System
//!
//! - **Stores**: blocks by hash, rounds by number, magic blocks by starting
//!   round. Blocks whose predecessor is unknown wait in the store flagged
//!   `no_previous` until it arrives.
//! - **Finalization**: the best-ranked notarized block extending the LFB is
//!   promoted, one round at a time. Each promotion is pushed to bounded
//!   queues; a full queue stops finalization rather than dropping.
//! - **Membership**: a finalized block carrying a magic block triggers a
//!   view change before the LFB moves.
//! - **Sharding**: sharder selection per block via the node-pool scorer.
//! - **State**: block state nodes, sync of missing nodes, pruning with a
//!   retention window.
//!
//! ```text
//!                 ┌──────────────── RoundPipeline ────────────────┐
//!                 │  open(LFB+1) ─► seed ─► timeout ─► retry       │
//!                 └───────────────┬───────────────────────────────┘
//!                                 │ add_round_block
//!   BlockFetcher ──► on_block_fetched ──► Chain ──► try_finalize ──► LFB
//!       ▲                                   │                        │
//!       └──────── request_fetch ◄───────────┘        bus events ◄────┤
//!                                                    LFB ticket ◄────┤
//!                                               finalized queues ◄───┘
//! ```

#![warn(clippy::all)]

pub mod adapters;
pub mod config;
pub mod domain;
pub mod error;
pub mod global;
pub mod pipeline;
pub mod ports;
pub mod service;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use adapters::{
    ChainFetchCompletion, ChainFetchTargets, EntityStoreMagicBlockSaver, HashSeedSource, InMemoryEntityStore,
    InMemoryRoundStorage, TrieStateNodeSource,
};
pub use config::ChainConfig;
pub use domain::{
    ActivationState, ChainSnapshot, ChainStatsSnapshot, FeeStats, PruneStats, RankedBlock, Round, RoundFactory,
    RoundPhase,
};
pub use error::{ChainError, ChainResult, ErrorKind};
pub use global::{clear_server_chain, server_chain, set_server_chain};
pub use pipeline::{PipelineStatus, RoundPipeline, RoundPipelineHandle};
pub use ports::*;
pub use service::{Chain, ChainDependencies, FinalizationOutcome, FinalizationStop};
