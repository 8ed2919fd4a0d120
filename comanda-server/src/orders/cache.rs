//! Active-orders cache with explicit optimistic-update phases
//!
//! Each entry tracks which side of the reconciliation it is on:
//!
//! ```text
//! Confirmed ──update_item_status──▶ Optimistic ──reconcile──▶ Confirmed
//!                                       │
//!                                       └──resync overwrote──▶ RolledBack
//! ```
//!
//! `RolledBack` marks an entry whose optimistic state was overwritten by an
//! authoritative reload that disagreed with it; the next mutation or
//! reconcile moves it back into the normal cycle.

use dashmap::DashMap;
use serde::Serialize;
use shared::Order;

/// Reconciliation phase of one cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryPhase {
    /// Matches the last authoritative read
    Confirmed,
    /// Mutated locally, reconciliation pending
    Optimistic,
    /// An authoritative reload overwrote diverged optimistic state
    RolledBack,
}

/// One cached order plus its phase
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub order: Order,
    pub phase: EntryPhase,
    /// Last write to this entry (Unix milliseconds)
    pub cached_at: i64,
}

/// Concurrent map of active orders, keyed by order id
#[derive(Debug, Default)]
pub struct ActiveOrderCache {
    entries: DashMap<String, CacheEntry>,
}

impl ActiveOrderCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Insert or overwrite an entry as authoritative
    pub fn insert_confirmed(&self, order: Order) {
        self.entries.insert(
            order.id.clone(),
            CacheEntry {
                order,
                phase: EntryPhase::Confirmed,
                cached_at: chrono::Utc::now().timestamp_millis(),
            },
        );
    }

    /// Replace the whole cache with an authoritative set (full sync)
    pub fn replace_all(&self, orders: Vec<Order>) {
        self.entries.clear();
        for order in orders {
            self.insert_confirmed(order);
        }
    }

    /// Mutate one order under the entry lock, stamping it optimistic
    ///
    /// The closure returning `false` leaves the entry untouched (lookup
    /// failure inside the order). Returns `None` for an unknown order.
    pub fn apply_optimistic<F>(&self, order_id: &str, mutate: F) -> Option<bool>
    where
        F: FnOnce(&mut Order) -> bool,
    {
        let mut entry = self.entries.get_mut(order_id)?;
        if !mutate(&mut entry.order) {
            return Some(false);
        }
        entry.phase = EntryPhase::Optimistic;
        entry.cached_at = chrono::Utc::now().timestamp_millis();
        Some(true)
    }

    /// Overwrite with an authoritative reload, resolving the phase
    ///
    /// A diverged optimistic entry lands in `RolledBack`; everything else
    /// confirms.
    pub fn reconcile(&self, order: Order) -> EntryPhase {
        let phase = match self.entries.get(&order.id) {
            Some(entry) if entry.phase == EntryPhase::Optimistic && entry.order != order => {
                EntryPhase::RolledBack
            }
            _ => EntryPhase::Confirmed,
        };
        self.entries.insert(
            order.id.clone(),
            CacheEntry {
                order,
                phase,
                cached_at: chrono::Utc::now().timestamp_millis(),
            },
        );
        phase
    }

    pub fn remove(&self, order_id: &str) -> Option<Order> {
        self.entries.remove(order_id).map(|(_, e)| e.order)
    }

    pub fn get(&self, order_id: &str) -> Option<Order> {
        self.entries.get(order_id).map(|e| e.order.clone())
    }

    pub fn phase(&self, order_id: &str) -> Option<EntryPhase> {
        self.entries.get(order_id).map(|e| e.phase)
    }

    pub fn contains(&self, order_id: &str) -> bool {
        self.entries.contains_key(order_id)
    }

    /// Clone of every cached order
    pub fn snapshot(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.entries.iter().map(|e| e.order.clone()).collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        orders
    }

    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
