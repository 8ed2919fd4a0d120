//! Consolidated notifications - derived, recomputed-on-read summaries
//!
//! Never persisted as a source of truth: the consolidator rebuilds them from
//! the current order/line snapshot on every request and the UI discards them
//! after display.

use crate::types::{Priority, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Consolidated notification kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    TableStatus,
    StationStatus,
    PaymentRequest,
    ReadyItems,
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationKind::TableStatus => write!(f, "table-status"),
            NotificationKind::StationStatus => write!(f, "station-status"),
            NotificationKind::PaymentRequest => write!(f, "payment-request"),
            NotificationKind::ReadyItems => write!(f, "ready-items"),
        }
    }
}

/// Human-relevant summary of many raw events for one table or station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedNotification {
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub priority: Priority,
    pub target_roles: Vec<Role>,
    /// Derived from the newest contributing line transition, not the wall
    /// clock, so identical snapshots consolidate identically
    pub timestamp: i64,
    pub acknowledged: bool,
}

impl ConsolidatedNotification {
    pub fn new(
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        priority: Priority,
        target_roles: Vec<Role>,
        timestamp: i64,
    ) -> Self {
        Self {
            kind,
            title: title.into(),
            message: message.into(),
            priority,
            target_roles,
            timestamp,
            acknowledged: false,
        }
    }
}
