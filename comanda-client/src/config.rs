use std::time::Duration;

use shared::Priority;

/// Reconciliation loop configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Poll cadence while the connection is healthy
    pub poll_interval: Duration,
    /// Escalated cadence while disconnected
    pub disconnected_poll_interval: Duration,
    /// Defensive minimum priority; HIGH and URGENT always pass regardless.
    /// Server-side role resolution is authoritative, this only trims noise.
    pub min_priority: Option<Priority>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            disconnected_poll_interval: Duration::from_millis(500),
            min_priority: None,
        }
    }
}

impl ClientConfig {
    pub fn with_min_priority(mut self, priority: Priority) -> Self {
        self.min_priority = Some(priority);
        self
    }
}
