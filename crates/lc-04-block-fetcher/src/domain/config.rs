use std::time::Duration;

/// Block fetcher configuration.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Concurrent attempts against miners.
    pub max_from_miners: usize,
    /// Concurrent attempts against sharders.
    pub max_from_sharders: usize,
    /// Distinct hashes tracked at once.
    pub max_in_flight: usize,
    /// Peers contacted per hash, across both phases.
    pub max_attempts: u32,
    /// Timeout of a single peer request.
    pub request_timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            max_from_miners: 100,
            max_from_sharders: 30,
            max_in_flight: 130,
            max_attempts: 8,
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl FetcherConfig {
    pub fn with_limits(mut self, from_miners: usize, from_sharders: usize) -> Self {
        self.max_from_miners = from_miners.max(1);
        self.max_from_sharders = from_sharders.max(1);
        self
    }

    pub fn with_max_in_flight(mut self, max: usize) -> Self {
        self.max_in_flight = max.max(1);
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Capacity of the request queue.
    pub fn command_capacity(&self) -> usize {
        self.max_from_miners + self.max_from_sharders
    }
}
