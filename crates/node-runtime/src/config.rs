//! # Node Configuration
//!
//! Defaults for every worker, overlaid with `LC_*` environment variables.
//!
//! | Variable | Field |
//! |----------|-------|
//! | `LC_GENERATE_TIMEOUT_MS` | `chain.generate_timeout` |
//! | `LC_RETRY_WAIT_MS` | `chain.retry_wait_time` |
//! | `LC_RETENTION_WINDOW` | `chain.retention_window` |
//! | `LC_REPLICATION_FACTOR` | `chain.replication_factor` |
//! | `LC_NOTARIZATION_RATIO` | `chain.notarization_ratio` |
//! | `LC_SIGNATURE_SCHEME` | `chain.signature_scheme` |
//! | `LC_CONFIG_INFO_DB` | `chain.config_info_db` |
//! | `LC_TICKET_REBROADCAST_MS` | `lfb_ticket.rebroadcast_interval` |
//! | `LC_FETCH_TIMEOUT_MS` | `fetcher.request_timeout` |
//! | `LC_FETCH_MAX_ATTEMPTS` | `fetcher.max_attempts` |
//! | `LC_CHAIN_ID` | `devnet.chain_id` |
//! | `LC_MINERS` / `LC_SHARDERS` | `devnet.miners` / `devnet.sharders` |
//! | `LC_NODE_ROLE` / `LC_NODE_INDEX` | `devnet.role` / `devnet.node_index` |
//! | `LC_PRUNE_INTERVAL` | `devnet.prune_interval` |

use lc_03_lfb_ticket::LfbTicketConfig;
use lc_04_block_fetcher::FetcherConfig;
use lc_05_chain::{ChainConfig, ChainError};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{name}={value:?}: {reason}")]
    InvalidVar {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("devnet: {0}")]
    Devnet(String),

    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// What this node does in the devnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Miner,
    /// Sharders sign and broadcast LFB tickets.
    Sharder,
}

impl FromStr for NodeRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "miner" => Ok(NodeRole::Miner),
            "sharder" => Ok(NodeRole::Sharder),
            other => Err(format!("unknown role {other}")),
        }
    }
}

/// Single-process network layout used when no membership is supplied.
#[derive(Debug, Clone)]
pub struct DevnetConfig {
    /// Hex chain id, or any label (hashed).
    pub chain_id: String,
    pub miners: usize,
    pub sharders: usize,
    pub role: NodeRole,
    /// Index of this node within its role's pool.
    pub node_index: usize,
    /// Prune state every this many finalized rounds. Zero disables.
    pub prune_interval: u64,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            chain_id: "0afc093ffb509f059c55478bc1a60351cef7b4e9c008a53a6cc8241ca8617dfe".into(),
            miners: 4,
            sharders: 2,
            role: NodeRole::Sharder,
            node_index: 0,
            prune_interval: 100,
        }
    }
}

/// Complete node configuration.
#[derive(Debug, Clone, Default)]
pub struct NodeConfig {
    pub chain: ChainConfig,
    pub lfb_ticket: LfbTicketConfig,
    pub fetcher: FetcherConfig,
    pub devnet: DevnetConfig,
}

impl NodeConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with whatever `lookup` returns per variable.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let env = Overlay { lookup: &lookup };

        if let Some(ms) = env.parse::<u64>("LC_GENERATE_TIMEOUT_MS")? {
            config.chain.generate_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = env.parse::<u64>("LC_RETRY_WAIT_MS")? {
            config.chain.retry_wait_time = Duration::from_millis(ms);
        }
        if let Some(rounds) = env.parse("LC_RETENTION_WINDOW")? {
            config.chain.retention_window = rounds;
        }
        if let Some(factor) = env.parse("LC_REPLICATION_FACTOR")? {
            config.chain.replication_factor = factor;
        }
        if let Some(ratio) = env.parse("LC_NOTARIZATION_RATIO")? {
            config.chain.notarization_ratio = ratio;
        }
        if let Some(scheme) = env.get("LC_SIGNATURE_SCHEME") {
            config.chain.signature_scheme = scheme;
        }
        if let Some(db) = env.get("LC_CONFIG_INFO_DB") {
            config.chain.config_info_db = db;
        }

        if let Some(ms) = env.parse::<u64>("LC_TICKET_REBROADCAST_MS")? {
            config.lfb_ticket.rebroadcast_interval = Duration::from_millis(ms);
        }
        if let Some(ms) = env.parse::<u64>("LC_FETCH_TIMEOUT_MS")? {
            config.fetcher.request_timeout = Duration::from_millis(ms);
        }
        if let Some(attempts) = env.parse("LC_FETCH_MAX_ATTEMPTS")? {
            config.fetcher.max_attempts = attempts;
        }

        if let Some(chain_id) = env.get("LC_CHAIN_ID") {
            config.devnet.chain_id = chain_id;
        }
        if let Some(miners) = env.parse("LC_MINERS")? {
            config.devnet.miners = miners;
        }
        if let Some(sharders) = env.parse("LC_SHARDERS")? {
            config.devnet.sharders = sharders;
        }
        if let Some(role) = env.parse("LC_NODE_ROLE")? {
            config.devnet.role = role;
        }
        if let Some(index) = env.parse("LC_NODE_INDEX")? {
            config.devnet.node_index = index;
        }
        if let Some(interval) = env.parse("LC_PRUNE_INTERVAL")? {
            config.devnet.prune_interval = interval;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.chain.validate()?;
        let devnet = &self.devnet;
        if devnet.miners == 0 {
            return Err(ConfigError::Devnet("at least one miner is required".into()));
        }
        let pool = match devnet.role {
            NodeRole::Miner => devnet.miners,
            NodeRole::Sharder => devnet.sharders,
        };
        if devnet.node_index >= pool {
            return Err(ConfigError::Devnet(format!(
                "node index {} outside a pool of {}",
                devnet.node_index, pool
            )));
        }
        Ok(())
    }
}

struct Overlay<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
}

impl<F: Fn(&str) -> Option<String>> Overlay<'_, F> {
    fn get(&self, name: &'static str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.trim().is_empty())
    }

    fn parse<T>(&self, name: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some(value) = self.get(name) else {
            return Ok(None);
        };
        value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidVar {
                name,
                value,
                reason: e.to_string(),
            })
    }
}
