use std::time::Duration;

/// Ticket worker configuration.
#[derive(Debug, Clone)]
pub struct LfbTicketConfig {
    /// Silence after which a sharder re-sends its latest ticket.
    pub rebroadcast_interval: Duration,
    /// Capacity of the worker's command queue.
    pub command_capacity: usize,
    /// How many rounds the local LFB may trail the ticket before the node
    /// counts as syncing.
    pub ahead: u64,
}

impl Default for LfbTicketConfig {
    fn default() -> Self {
        Self {
            rebroadcast_interval: Duration::from_secs(16),
            command_capacity: 256,
            ahead: 2,
        }
    }
}

impl LfbTicketConfig {
    pub fn with_rebroadcast_interval(mut self, interval: Duration) -> Self {
        self.rebroadcast_interval = interval;
        self
    }

    pub fn with_command_capacity(mut self, capacity: usize) -> Self {
        self.command_capacity = capacity.max(1);
        self
    }

    pub fn with_ahead(mut self, ahead: u64) -> Self {
        self.ahead = ahead;
        self
    }
}
