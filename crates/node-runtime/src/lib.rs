//! # Node Runtime Library
//!
//! Assembles a devnet node around the LC-05 chain coordinator. The binary in
//! `main.rs` is a thin shell over [`NodeRuntime`].
//!
//! ```text
//!   NodeConfig (defaults + LC_* env)
//!        │
//!        ▼
//!   NodeRuntime::start ──► Chain ──► genesis
//!        │                  ├──► LfbTicketService
//!        │                  ├──► BlockFetcher (OfflineBlockSource)
//!        │                  ├──► RoundPipeline (HashSeedSource)
//!        │                  └──► maintenance (finalized queues, pruning)
//!        ▼
//!   NodeRuntime::shutdown
//! ```

#![warn(clippy::all)]

pub mod config;
pub mod genesis;
pub mod network;
pub mod runtime;

pub use config::{ConfigError, DevnetConfig, NodeConfig, NodeRole};
pub use genesis::DevnetKeys;
pub use network::OfflineBlockSource;
pub use runtime::NodeRuntime;
