//! Coordinator configuration.

use crate::error::{ChainError, ChainResult};
use shared_crypto::{ED25519, SECP256K1};
use std::time::Duration;

/// Chain coordinator configuration.
///
/// Ratios are whole percentages (`66` means 66%).
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Time a generator gets before the round is considered failed.
    pub generate_timeout: Duration,
    /// Wait between round retries.
    pub retry_wait_time: Duration,
    /// Rounds kept below the LFB by pruning.
    pub retention_window: u64,
    /// Sharders that store each block. `0` means all of them.
    pub replication_factor: usize,
    /// Miners that must sign for a block to be notarized.
    pub notarization_ratio: u32,
    /// Signature scheme name, resolved at construction.
    pub signature_scheme: String,
    /// Entity-store namespace for genesis and the coordinator snapshot.
    pub config_info_db: String,
    pub min_generators: usize,
    pub generators_percent: u32,
    /// Active sharders required before blocks can be sharded.
    pub min_active_sharders: u32,
    /// Active replicators required per block, relative to the replication factor.
    pub min_active_replicators: u32,
    /// Signers needed for a finalized block to become the LDB.
    pub deterministic_ratio: u32,
    /// Max age gap, seconds, between a transaction and the blocks that may hold it.
    pub txn_time_tolerance: u64,
    /// Capacity of the finalized-block and finalized-round queues.
    pub finalized_queue_capacity: usize,
    /// Upper bound on one state sync from peers.
    pub state_sync_timeout: Duration,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            generate_timeout: Duration::from_secs(15),
            retry_wait_time: Duration::from_secs(5),
            retention_window: 50,
            replication_factor: 2,
            notarization_ratio: 66,
            signature_scheme: ED25519.to_string(),
            config_info_db: "configdb".to_string(),
            min_generators: 2,
            generators_percent: 20,
            min_active_sharders: 25,
            min_active_replicators: 25,
            deterministic_ratio: 80,
            txn_time_tolerance: 60,
            finalized_queue_capacity: 128,
            state_sync_timeout: Duration::from_secs(10),
        }
    }
}

impl ChainConfig {
    pub fn with_generate_timeout(mut self, timeout: Duration) -> Self {
        self.generate_timeout = timeout;
        self
    }

    pub fn with_retry_wait_time(mut self, wait: Duration) -> Self {
        self.retry_wait_time = wait;
        self
    }

    pub fn with_retention_window(mut self, rounds: u64) -> Self {
        self.retention_window = rounds;
        self
    }

    pub fn with_replication_factor(mut self, factor: usize) -> Self {
        self.replication_factor = factor;
        self
    }

    pub fn with_notarization_ratio(mut self, percent: u32) -> Self {
        self.notarization_ratio = percent;
        self
    }

    pub fn with_signature_scheme(mut self, scheme: impl Into<String>) -> Self {
        self.signature_scheme = scheme.into();
        self
    }

    pub fn with_config_info_db(mut self, namespace: impl Into<String>) -> Self {
        self.config_info_db = namespace.into();
        self
    }

    pub fn with_generators(mut self, min_generators: usize, percent: u32) -> Self {
        self.min_generators = min_generators;
        self.generators_percent = percent;
        self
    }

    pub fn with_min_active(mut self, sharders: u32, replicators: u32) -> Self {
        self.min_active_sharders = sharders;
        self.min_active_replicators = replicators;
        self
    }

    pub fn with_deterministic_ratio(mut self, percent: u32) -> Self {
        self.deterministic_ratio = percent;
        self
    }

    pub fn with_txn_time_tolerance(mut self, secs: u64) -> Self {
        self.txn_time_tolerance = secs;
        self
    }

    pub fn with_finalized_queue_capacity(mut self, capacity: usize) -> Self {
        self.finalized_queue_capacity = capacity;
        self
    }

    pub fn with_state_sync_timeout(mut self, timeout: Duration) -> Self {
        self.state_sync_timeout = timeout;
        self
    }

    /// Reject settings the coordinator cannot run with.
    pub fn validate(&self) -> ChainResult<()> {
        let percents = [
            ("notarization_ratio", self.notarization_ratio),
            ("generators_percent", self.generators_percent),
            ("min_active_sharders", self.min_active_sharders),
            ("min_active_replicators", self.min_active_replicators),
            ("deterministic_ratio", self.deterministic_ratio),
        ];
        for (name, value) in percents {
            if value > 100 {
                return Err(ChainError::Config(format!("{name} must be within 0..=100, got {value}")));
            }
        }
        if self.notarization_ratio == 0 {
            return Err(ChainError::Config("notarization_ratio must be positive".into()));
        }
        if self.retention_window == 0 {
            return Err(ChainError::Config("retention_window must be positive".into()));
        }
        if self.finalized_queue_capacity == 0 {
            return Err(ChainError::Config("finalized_queue_capacity must be positive".into()));
        }
        if self.config_info_db.is_empty() {
            return Err(ChainError::Config("config_info_db must be named".into()));
        }
        if self.signature_scheme != ED25519 && self.signature_scheme != SECP256K1 {
            return Err(ChainError::Config(format!(
                "unknown signature scheme: {}",
                self.signature_scheme
            )));
        }
        Ok(())
    }
}
