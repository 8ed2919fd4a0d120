//! Server configuration
//!
//! All knobs load from environment variables with working defaults:
//!
//! | Variable | Default | Meaning |
//! |----------|---------|---------|
//! | TENANT_ID | default | Tenant this broker instance serves |
//! | ENVIRONMENT | development | development \| staging \| production |
//! | EVENT_TTL_SECONDS | 300 | Default event discard window |
//! | MAX_EVENTS_PER_RECIPIENT | 500 | Per-recipient stream cap |
//! | OFFLINE_QUEUE_CAPACITY | 1000 | Per-connection replay queue cap |
//! | FULL_SYNC_INTERVAL_SECS | 300 | Periodic full sync timer |
//! | INCREMENTAL_SYNC_INTERVAL_SECS | 2 | Dirty-queue reconcile timer |
//! | DIRTY_BATCH_LIMIT | 50 | Max orders per incremental pass |
//! | SWEEP_INTERVAL_SECS | 60 | Store/queue TTL sweeper timer |
//! | AGE_PRIORITY_MINUTES | 10 | Line age escalating to HIGH |
//! | AGE_URGENT_MINUTES | 20 | Line age escalating to URGENT |

use std::time::Duration;

use crate::consolidate::AgeThresholds;
use crate::orders::SyncSettings;

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Broker configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Tenant this broker instance serves (one broker per venue)
    pub tenant_id: String,
    /// Runtime environment: development | staging | production
    pub environment: String,
    pub event_ttl_seconds: u64,
    pub max_events_per_recipient: usize,
    pub offline_queue_capacity: usize,
    pub full_sync_interval_secs: u64,
    pub incremental_sync_interval_secs: u64,
    pub dirty_batch_limit: usize,
    pub sweep_interval_secs: u64,
    pub age_priority_minutes: i64,
    pub age_urgent_minutes: i64,
}

impl Config {
    /// Load from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        Self {
            tenant_id: std::env::var("TENANT_ID").unwrap_or_else(|_| "default".into()),
            environment: std::env::var("ENVIRONMENT").unwrap_or_else(|_| "development".into()),
            event_ttl_seconds: env_parse("EVENT_TTL_SECONDS", 300),
            max_events_per_recipient: env_parse("MAX_EVENTS_PER_RECIPIENT", 500),
            offline_queue_capacity: env_parse("OFFLINE_QUEUE_CAPACITY", 1000),
            full_sync_interval_secs: env_parse("FULL_SYNC_INTERVAL_SECS", 300),
            incremental_sync_interval_secs: env_parse("INCREMENTAL_SYNC_INTERVAL_SECS", 2),
            dirty_batch_limit: env_parse("DIRTY_BATCH_LIMIT", 50),
            sweep_interval_secs: env_parse("SWEEP_INTERVAL_SECS", 60),
            age_priority_minutes: env_parse("AGE_PRIORITY_MINUTES", 10),
            age_urgent_minutes: env_parse("AGE_URGENT_MINUTES", 20),
        }
    }

    /// Override the tenant, typically in tests
    pub fn with_tenant(tenant_id: impl Into<String>) -> Self {
        let mut config = Self::from_env();
        config.tenant_id = tenant_id.into();
        config
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            full_sync_interval: Duration::from_secs(self.full_sync_interval_secs),
            incremental_interval: Duration::from_secs(self.incremental_sync_interval_secs),
            dirty_batch_limit: self.dirty_batch_limit,
        }
    }

    pub fn age_thresholds(&self) -> AgeThresholds {
        AgeThresholds {
            priority_minutes: self.age_priority_minutes,
            urgent_minutes: self.age_urgent_minutes,
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}
