//! Connection health - measured client-side, surfaced to status indicators

use serde::{Deserialize, Serialize};
use std::fmt;

/// Round-trip quality buckets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionQuality {
    /// < 100 ms round trip
    Excellent,
    /// < 300 ms round trip
    Good,
    /// Anything slower
    Poor,
    /// Not connected
    Offline,
}

impl ConnectionQuality {
    /// Classify a measured round-trip latency
    pub fn from_latency_ms(latency_ms: u64) -> Self {
        if latency_ms < 100 {
            ConnectionQuality::Excellent
        } else if latency_ms < 300 {
            ConnectionQuality::Good
        } else {
            ConnectionQuality::Poor
        }
    }
}

impl fmt::Display for ConnectionQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionQuality::Excellent => write!(f, "excellent"),
            ConnectionQuality::Good => write!(f, "good"),
            ConnectionQuality::Poor => write!(f, "poor"),
            ConnectionQuality::Offline => write!(f, "offline"),
        }
    }
}

/// Snapshot of one connection's health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionHealth {
    pub connected: bool,
    pub quality: ConnectionQuality,
    pub latency_ms: u64,
    pub reconnect_attempts: u32,
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self {
            connected: false,
            quality: ConnectionQuality::Offline,
            latency_ms: 0,
            reconnect_attempts: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quality_thresholds() {
        assert_eq!(
            ConnectionQuality::from_latency_ms(40),
            ConnectionQuality::Excellent
        );
        assert_eq!(
            ConnectionQuality::from_latency_ms(100),
            ConnectionQuality::Good
        );
        assert_eq!(
            ConnectionQuality::from_latency_ms(299),
            ConnectionQuality::Good
        );
        assert_eq!(
            ConnectionQuality::from_latency_ms(300),
            ConnectionQuality::Poor
        );
    }
}
