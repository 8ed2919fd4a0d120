//! Offline delivery queue - replay buffer for not-yet-acknowledged events
//!
//! One bounded queue per connection. Entries are created when the broadcast
//! service targets a connection that is offline, or ahead of delivery
//! confirmation for acknowledgment-required events, and removed on
//! acknowledgment or TTL expiry. This module exclusively owns acknowledgment
//! state.
//!
//! Overflow policy: drop the oldest entries that do not require
//! acknowledgment first; an acknowledgment-required entry is dropped only as
//! a last resort and the loss is logged and counted. A TTL-expired
//! ack-required entry is a silent loss by design - expected degraded
//! behavior, recovered by entity resync, never a hard failure.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Serialize;
use shared::Event;

/// Per-connection queue entry
#[derive(Debug, Clone)]
pub struct QueuedEvent {
    pub event: Arc<Event>,
    /// Handed to the connection at least once (via `drain`)
    pub delivered: bool,
    pub acknowledged: bool,
    /// Enqueue timestamp (Unix milliseconds)
    pub enqueued_at: i64,
}

/// Aggregate queue health for one connection
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueHealth {
    /// Entries waiting in the queue
    pub pending: usize,
    /// Pending entries that require acknowledgment
    pub awaiting_ack: usize,
    /// Entries dropped by overflow or TTL since process start (all queues)
    pub dropped_total: u64,
    /// Acknowledgment-required entries among the dropped (all queues)
    pub dropped_ack_required: u64,
}

/// Bounded per-connection replay queues
#[derive(Debug)]
pub struct OfflineQueue {
    queues: DashMap<String, VecDeque<QueuedEvent>>,
    capacity: usize,
    default_ttl_seconds: u64,
    dropped: AtomicU64,
    dropped_ack_required: AtomicU64,
}

impl OfflineQueue {
    pub fn new(capacity: usize, default_ttl_seconds: u64) -> Self {
        Self {
            queues: DashMap::new(),
            capacity,
            default_ttl_seconds,
            dropped: AtomicU64::new(0),
            dropped_ack_required: AtomicU64::new(0),
        }
    }

    fn sweep(&self, queue: &mut VecDeque<QueuedEvent>, now_ms: i64) {
        let before = queue.len();
        queue.retain(|q| {
            let keep = !q.event.is_expired(now_ms, self.default_ttl_seconds);
            if !keep && q.event.requires_ack {
                self.dropped_ack_required.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(
                    event_id = %q.event.id,
                    "Acknowledgment-required event expired unacknowledged"
                );
            }
            keep
        });
        self.dropped
            .fetch_add((before - queue.len()) as u64, Ordering::Relaxed);
    }

    /// Add an event to the connection's queue
    pub fn enqueue(&self, connection_id: &str, event: Arc<Event>) {
        let now = chrono::Utc::now().timestamp_millis();
        let mut queue = self.queues.entry(connection_id.to_string()).or_default();

        self.sweep(&mut queue, now);

        while queue.len() >= self.capacity {
            // Oldest non-ack-required entry goes first
            let victim = queue
                .iter()
                .position(|q| !q.event.requires_ack)
                .unwrap_or(0);
            if let Some(lost) = queue.remove(victim) {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                if lost.event.requires_ack {
                    self.dropped_ack_required.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        connection = %connection_id,
                        event_id = %lost.event.id,
                        "Queue overflow dropped an acknowledgment-required event"
                    );
                }
            }
        }

        queue.push_back(QueuedEvent {
            event,
            delivered: false,
            acknowledged: false,
            enqueued_at: now,
        });
    }

    /// Return all pending entries, marking them delivered without clearing
    ///
    /// A reconnecting consumer must drain before resuming live consumption,
    /// then acknowledge each `requires_ack` entry (or let it expire by TTL).
    pub fn drain(&self, connection_id: &str) -> Vec<QueuedEvent> {
        let now = chrono::Utc::now().timestamp_millis();
        let Some(mut queue) = self.queues.get_mut(connection_id) else {
            return Vec::new();
        };
        self.sweep(&mut queue, now);
        for entry in queue.iter_mut() {
            entry.delivered = true;
        }
        queue.iter().cloned().collect()
    }

    /// Mark the entry acknowledged and remove it from the queue
    ///
    /// Returns false when the event is not queued for this connection
    /// (already acknowledged, expired, or never enqueued) - callers treat
    /// that as a no-op.
    pub fn acknowledge(&self, connection_id: &str, event_id: &str) -> bool {
        let Some(mut queue) = self.queues.get_mut(connection_id) else {
            return false;
        };
        let Some(pos) = queue.iter().position(|q| q.event.id == event_id) else {
            return false;
        };
        queue.remove(pos);
        true
    }

    /// Snapshot of the connection's queue health
    pub fn health_snapshot(&self, connection_id: &str) -> QueueHealth {
        let (pending, awaiting_ack) = self
            .queues
            .get(connection_id)
            .map(|q| {
                (
                    q.len(),
                    q.iter().filter(|e| e.event.requires_ack).count(),
                )
            })
            .unwrap_or((0, 0));
        QueueHealth {
            pending,
            awaiting_ack,
            dropped_total: self.dropped.load(Ordering::Relaxed),
            dropped_ack_required: self.dropped_ack_required.load(Ordering::Relaxed),
        }
    }

    /// Drop the connection's queue entirely (session removed)
    pub fn remove_connection(&self, connection_id: &str) {
        self.queues.remove(connection_id);
    }

    /// Sweep every queue, discarding TTL-expired entries
    pub fn sweep_expired(&self) {
        let now = chrono::Utc::now().timestamp_millis();
        for mut queue in self.queues.iter_mut() {
            self.sweep(&mut queue, now);
        }
        self.queues.retain(|_, q| !q.is_empty());
    }
}
