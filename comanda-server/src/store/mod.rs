//! In-memory event store - per-recipient append-only streams
//!
//! Streams are keyed by `(tenant_id, recipient_id)`. Within one stream,
//! append order equals delivery order; there is no cross-recipient ordering
//! guarantee. The store exclusively owns event lifecycle: append, read
//! flags, TTL sweep and the per-recipient cap. Acknowledgment state lives in
//! the offline delivery queue, not here.
//!
//! Events are authored once and shared across recipient streams behind an
//! `Arc`; the per-recipient state (sequence, read flag) wraps the shared
//! event. No durable log is kept - anything lost here is recovered by a
//! full resync of the affected entity.

use std::collections::VecDeque;
use std::sync::Arc;

use dashmap::DashMap;
use shared::Event;

/// One event as it sits in a recipient's stream
#[derive(Debug, Clone)]
struct StoredEvent {
    /// Position in this recipient's stream - the FIFO ordering signal
    seq: u64,
    /// Read flag, flipped by cursorless `get_unread` or `mark_read`
    read: bool,
    event: Arc<Event>,
}

#[derive(Debug, Default)]
struct RecipientStream {
    entries: VecDeque<StoredEvent>,
    next_seq: u64,
}

impl RecipientStream {
    fn sweep(&mut self, now_ms: i64, default_ttl: u64) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| !e.event.is_expired(now_ms, default_ttl));
        before - self.entries.len()
    }
}

/// Per-tenant, per-recipient bounded event buffer
#[derive(Debug)]
pub struct EventStore {
    streams: DashMap<(String, String), RecipientStream>,
    max_events_per_recipient: usize,
    default_ttl_seconds: u64,
}

impl EventStore {
    pub fn new(max_events_per_recipient: usize, default_ttl_seconds: u64) -> Self {
        Self {
            streams: DashMap::new(),
            max_events_per_recipient,
            default_ttl_seconds,
        }
    }

    /// Append an event to the recipient's stream, returning its sequence
    ///
    /// Runs the lazy TTL sweep and enforces the per-recipient cap (oldest
    /// dropped first) on every call.
    pub fn append(&self, tenant_id: &str, recipient_id: &str, event: Arc<Event>) -> u64 {
        let now = chrono::Utc::now().timestamp_millis();
        let mut stream = self
            .streams
            .entry((tenant_id.to_string(), recipient_id.to_string()))
            .or_default();

        stream.sweep(now, self.default_ttl_seconds);

        while stream.entries.len() >= self.max_events_per_recipient {
            if let Some(dropped) = stream.entries.pop_front() {
                tracing::debug!(
                    recipient = %recipient_id,
                    event_id = %dropped.event.id,
                    "Stream at capacity, dropped oldest event"
                );
            }
        }

        stream.next_seq += 1;
        let seq = stream.next_seq;
        stream.entries.push_back(StoredEvent {
            seq,
            read: false,
            event,
        });
        seq
    }

    /// Fetch events for a recipient
    ///
    /// With `last_event_id`, returns every event strictly after it in stream
    /// order and leaves read flags untouched - the client's cursor is
    /// authoritative. An id the stream no longer holds (expired or never
    /// delivered here) yields the whole stream, which at worst re-delivers.
    ///
    /// Without a cursor, returns all unread events and marks them read as a
    /// side effect (at-most-once read status, independent of
    /// acknowledgment).
    ///
    /// An unknown recipient is normal (fresh client) and yields an empty
    /// result.
    pub fn get_unread(
        &self,
        tenant_id: &str,
        recipient_id: &str,
        last_event_id: Option<&str>,
    ) -> Vec<Event> {
        let now = chrono::Utc::now().timestamp_millis();
        let Some(mut stream) = self
            .streams
            .get_mut(&(tenant_id.to_string(), recipient_id.to_string()))
        else {
            return Vec::new();
        };

        stream.sweep(now, self.default_ttl_seconds);

        match last_event_id {
            Some(id) => {
                let after = stream
                    .entries
                    .iter()
                    .find(|e| e.event.id == id)
                    .map(|e| e.seq);
                stream
                    .entries
                    .iter()
                    .filter(|e| after.is_none_or(|seq| e.seq > seq))
                    .map(|e| (*e.event).clone())
                    .collect()
            }
            None => {
                let mut out = Vec::new();
                for entry in stream.entries.iter_mut() {
                    if !entry.read {
                        entry.read = true;
                        out.push((*entry.event).clone());
                    }
                }
                out
            }
        }
    }

    /// Flag the given events as read for the recipient
    pub fn mark_read(&self, tenant_id: &str, recipient_id: &str, event_ids: &[String]) {
        if let Some(mut stream) = self
            .streams
            .get_mut(&(tenant_id.to_string(), recipient_id.to_string()))
        {
            for entry in stream.entries.iter_mut() {
                if event_ids.iter().any(|id| *id == entry.event.id) {
                    entry.read = true;
                }
            }
        }
    }

    /// Sweep every stream, dropping expired events and empty streams
    ///
    /// Complements the lazy per-access sweep so idle streams expire too.
    /// Returns the number of events discarded.
    pub fn sweep_expired(&self) -> usize {
        let now = chrono::Utc::now().timestamp_millis();
        let mut dropped = 0;
        for mut stream in self.streams.iter_mut() {
            dropped += stream.sweep(now, self.default_ttl_seconds);
        }
        self.streams.retain(|_, s| !s.entries.is_empty());
        if dropped > 0 {
            tracing::debug!(dropped, "Event store sweep discarded expired events");
        }
        dropped
    }

    /// Number of buffered events for a recipient
    pub fn stream_len(&self, tenant_id: &str, recipient_id: &str) -> usize {
        self.streams
            .get(&(tenant_id.to_string(), recipient_id.to_string()))
            .map(|s| s.entries.len())
            .unwrap_or(0)
    }
}
