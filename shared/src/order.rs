//! Order and line models mirrored from the persistent store
//!
//! These are the fully-hydrated structures the repository layer returns and
//! the sync service caches. Monetary math goes through `rust_decimal` and is
//! stored as f64 rounded to 2 decimal places.

use serde::{Deserialize, Serialize};
use std::fmt;

use rust_decimal::prelude::*;

/// Rounding for monetary values (2 decimal places, half-up)
const DECIMAL_PLACES: u32 = 2;

#[inline]
fn round_money(value: Decimal) -> f64 {
    value
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero)
        .to_f64()
        .unwrap_or_default()
}

// ==================== Stations ====================

/// Preparation station owning a subset of order lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Station {
    Bar,
    Kitchen,
}

impl Station {
    pub const ALL: [Station; 2] = [Station::Bar, Station::Kitchen];
}

impl fmt::Display for Station {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Station::Bar => write!(f, "BAR"),
            Station::Kitchen => write!(f, "KITCHEN"),
        }
    }
}

// ==================== Statuses ====================

/// Line preparation status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    #[default]
    Queued,
    InProgress,
    Ready,
    Delivered,
    Cancelled,
}

impl ItemStatus {
    /// Still owned by a preparation station
    pub fn is_pending(&self) -> bool {
        matches!(self, ItemStatus::Queued | ItemStatus::InProgress)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemStatus::Queued => write!(f, "QUEUED"),
            ItemStatus::InProgress => write!(f, "IN_PROGRESS"),
            ItemStatus::Ready => write!(f, "READY"),
            ItemStatus::Delivered => write!(f, "DELIVERED"),
            ItemStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Order status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    #[default]
    Open,
    AwaitingPayment,
    Completed,
    Void,
}

impl OrderStatus {
    /// Statuses the active-orders cache keeps in memory
    pub const ACTIVE: [OrderStatus; 2] = [OrderStatus::Open, OrderStatus::AwaitingPayment];

    pub fn is_active(&self) -> bool {
        Self::ACTIVE.contains(self)
    }
}

// ==================== Order Line ====================

/// Single order line, owned by one preparation station
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItem {
    pub id: String,
    pub name: String,
    pub quantity: i32,
    pub station: Station,
    pub status: ItemStatus,
    pub unit_price: f64,
    /// Creation timestamp (Unix milliseconds) - the age anchor for
    /// station-side urgency classification
    pub created_at: i64,
    /// Timestamp of the last status transition (Unix milliseconds)
    pub status_changed_at: i64,
}

impl OrderItem {
    pub fn new(
        name: impl Into<String>,
        quantity: i32,
        station: Station,
        unit_price: f64,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            quantity,
            station,
            status: ItemStatus::Queued,
            unit_price,
            created_at: now,
            status_changed_at: now,
        }
    }

    /// Transition to `status`, stamping the transition time
    pub fn set_status(&mut self, status: ItemStatus, now_ms: i64) {
        self.status = status;
        self.status_changed_at = now_ms;
    }

    /// Minutes since the line entered the queue
    pub fn age_minutes(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.created_at) / 60_000
    }

    /// Line total via decimal math
    pub fn line_total(&self) -> f64 {
        let price = Decimal::from_f64(self.unit_price).unwrap_or_default();
        round_money(price * Decimal::from(self.quantity))
    }
}

// ==================== Order ====================

/// Fully-hydrated order as returned by the repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub tenant_id: String,
    pub table_number: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,
    pub total: f64,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,
    /// Last mutation timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Order {
    pub fn new(tenant_id: impl Into<String>, table_number: impl Into<String>) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.into(),
            table_number: table_number.into(),
            status: OrderStatus::Open,
            items: Vec::new(),
            total: 0.0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Add a line and recompute the total
    pub fn add_item(&mut self, item: OrderItem) {
        self.items.push(item);
        self.recompute_total();
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }

    pub fn item(&self, item_id: &str) -> Option<&OrderItem> {
        self.items.iter().find(|i| i.id == item_id)
    }

    pub fn item_mut(&mut self, item_id: &str) -> Option<&mut OrderItem> {
        self.items.iter_mut().find(|i| i.id == item_id)
    }

    /// Lines owned by `station`
    pub fn items_for_station(&self, station: Station) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(move |i| i.station == station)
    }

    pub fn has_ready_items(&self) -> bool {
        self.items.iter().any(|i| i.status == ItemStatus::Ready)
    }

    /// Sum of non-cancelled line totals via decimal math
    pub fn recompute_total(&mut self) {
        let sum = self
            .items
            .iter()
            .filter(|i| i.status != ItemStatus::Cancelled)
            .fold(Decimal::ZERO, |acc, i| {
                acc + Decimal::from_f64(i.unit_price).unwrap_or_default()
                    * Decimal::from(i.quantity)
            });
        self.total = round_money(sum);
    }
}
