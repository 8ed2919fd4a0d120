//! Notification consolidator - collapse raw events into human summaries
//!
//! A waiter must not receive one message per line item. The consolidator is
//! a pure function of the current cache snapshot plus an explicit `now` used
//! only for age thresholds: identical snapshots always produce identical
//! notification sets, regardless of the order raw events arrived in.
//! Notification timestamps derive from line transition times, never from the
//! wall clock.
//!
//! At most one notification is produced per table (service view) and per
//! station (preparation view) per invocation.

use std::collections::BTreeMap;
use std::sync::Arc;

use shared::{
    ConsolidatedNotification, ItemStatus, NotificationKind, Order, OrderItem, OrderStatus,
    Priority, Role, Station,
};

use crate::orders::ActiveOrderCache;

/// Line-age thresholds for station-side urgency escalation
#[derive(Debug, Clone, Copy)]
pub struct AgeThresholds {
    pub priority_minutes: i64,
    pub urgent_minutes: i64,
}

impl Default for AgeThresholds {
    fn default() -> Self {
        Self {
            priority_minutes: 10,
            urgent_minutes: 20,
        }
    }
}

/// Station aggregate status; ready dominates working dominates idle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StationState {
    Idle,
    Working,
    Ready,
}

/// Read-side aggregator over the active-orders cache
#[derive(Clone)]
pub struct Consolidator {
    cache: Arc<ActiveOrderCache>,
    thresholds: AgeThresholds,
}

impl Consolidator {
    pub fn new(cache: Arc<ActiveOrderCache>, thresholds: AgeThresholds) -> Self {
        Self { cache, thresholds }
    }

    /// Consolidated notifications for one role at `now_ms`
    pub fn notifications_for_role(
        &self,
        role: Role,
        now_ms: i64,
    ) -> Vec<ConsolidatedNotification> {
        let snapshot = self.cache.snapshot();
        let mut out = Vec::new();
        match role {
            Role::Cameriere => out.extend(self.table_notifications(&snapshot)),
            Role::Prepara => out.extend(self.station_notifications(&snapshot, now_ms)),
            Role::Cassa => out.extend(self.payment_notifications(&snapshot)),
            Role::Supervisore => {
                out.extend(self.table_notifications(&snapshot));
                out.extend(self.station_notifications(&snapshot, now_ms));
                out.extend(self.payment_notifications(&snapshot));
            }
        }
        out
    }

    /// One notification per table with ready or in-preparation lines
    fn table_notifications(&self, snapshot: &[Order]) -> Vec<ConsolidatedNotification> {
        let mut tables: BTreeMap<&str, Vec<&OrderItem>> = BTreeMap::new();
        for order in snapshot.iter().filter(|o| o.status.is_active()) {
            tables
                .entry(order.table_number.as_str())
                .or_default()
                .extend(order.items.iter().filter(|i| {
                    i.status.is_pending() || i.status == ItemStatus::Ready
                }));
        }

        let mut out = Vec::new();
        for (table, items) in tables {
            let mut stations: BTreeMap<Station, (StationState, usize, usize)> = BTreeMap::new();
            for item in &items {
                let entry = stations
                    .entry(item.station)
                    .or_insert((StationState::Idle, 0, 0));
                match item.status {
                    ItemStatus::Ready => {
                        entry.0 = StationState::Ready;
                        entry.1 += 1;
                    }
                    ItemStatus::InProgress => {
                        if entry.0 == StationState::Idle {
                            entry.0 = StationState::Working;
                        }
                        entry.2 += 1;
                    }
                    _ => {}
                }
            }
            if stations
                .values()
                .all(|(state, _, _)| *state == StationState::Idle)
            {
                continue;
            }

            let ready_items: Vec<&&OrderItem> = items
                .iter()
                .filter(|i| i.status == ItemStatus::Ready)
                .collect();
            let timestamp = items
                .iter()
                .map(|i| i.status_changed_at)
                .max()
                .unwrap_or_default();

            let notification = if ready_items.is_empty() {
                let summary = stations
                    .iter()
                    .filter(|(_, (state, _, _))| *state != StationState::Idle)
                    .map(|(station, (_, _, working))| {
                        format!("{station}: {working} in preparation")
                    })
                    .collect::<Vec<_>>()
                    .join(", ");
                ConsolidatedNotification::new(
                    NotificationKind::TableStatus,
                    format!("Table {table}"),
                    summary,
                    Priority::Normal,
                    vec![Role::Cameriere, Role::Supervisore],
                    timestamp,
                )
            } else {
                let listing = ready_items
                    .iter()
                    .map(|i| format!("{} x{}", i.name, i.quantity))
                    .collect::<Vec<_>>()
                    .join(", ");
                ConsolidatedNotification::new(
                    NotificationKind::ReadyItems,
                    format!("Table {table}"),
                    format!("Ready to serve: {listing}"),
                    Priority::High,
                    vec![Role::Cameriere, Role::Supervisore],
                    timestamp,
                )
            };
            out.push(notification);
        }
        out
    }

    /// One notification per station with a pending backlog
    fn station_notifications(
        &self,
        snapshot: &[Order],
        now_ms: i64,
    ) -> Vec<ConsolidatedNotification> {
        let mut out = Vec::new();
        for station in Station::ALL {
            let mut pending: Vec<(&Order, &OrderItem)> = Vec::new();
            for order in snapshot.iter().filter(|o| o.status.is_active()) {
                for item in order.items_for_station(station) {
                    if item.status.is_pending() {
                        pending.push((order, item));
                    }
                }
            }
            if pending.is_empty() {
                continue;
            }

            let oldest_age = pending
                .iter()
                .map(|(_, i)| i.age_minutes(now_ms))
                .max()
                .unwrap_or_default();
            let priority = if oldest_age > self.thresholds.urgent_minutes {
                Priority::Urgent
            } else if oldest_age > self.thresholds.priority_minutes {
                Priority::High
            } else {
                Priority::Normal
            };

            let mut tables: Vec<&str> = pending
                .iter()
                .map(|(o, _)| o.table_number.as_str())
                .collect();
            tables.sort();
            tables.dedup();
            let timestamp = pending
                .iter()
                .map(|(_, i)| i.status_changed_at)
                .max()
                .unwrap_or_default();

            out.push(ConsolidatedNotification::new(
                NotificationKind::StationStatus,
                format!("Station {station}"),
                format!(
                    "{} lines pending for tables {}",
                    pending.len(),
                    tables.join(", ")
                ),
                priority,
                vec![Role::Prepara, Role::Supervisore],
                timestamp,
            ));
        }
        out
    }

    /// One payment request per table awaiting settlement
    fn payment_notifications(&self, snapshot: &[Order]) -> Vec<ConsolidatedNotification> {
        let mut tables: BTreeMap<&str, (f64, i64)> = BTreeMap::new();
        for order in snapshot
            .iter()
            .filter(|o| o.status == OrderStatus::AwaitingPayment)
        {
            let entry = tables.entry(order.table_number.as_str()).or_insert((0.0, 0));
            entry.0 += order.total;
            entry.1 = entry.1.max(order.updated_at);
        }

        tables
            .into_iter()
            .map(|(table, (amount, timestamp))| {
                ConsolidatedNotification::new(
                    NotificationKind::PaymentRequest,
                    format!("Table {table}"),
                    format!("Payment requested: {amount:.2}"),
                    Priority::High,
                    vec![Role::Cassa, Role::Supervisore],
                    timestamp,
                )
            })
            .collect()
    }
}
