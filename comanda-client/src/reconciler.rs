//! Client reconciliation loop
//!
//! Each tick polls the source with the last-seen event id, applies entity
//! changes in stream order, and checks every change's `previous_version`
//! against the local ledger. A mismatch is a version gap: the change is NOT
//! applied and the entity is scheduled for an authoritative resync instead.
//!
//! Connection health is measured from poll round trips; while disconnected
//! the loop escalates to the faster poll cadence until the transport comes
//! back, then drains the offline queue before resuming live consumption.

use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;

use shared::{ConnectionHealth, ConnectionQuality, EntityType, Event};

use crate::config::ClientConfig;
use crate::error::ClientResult;
use crate::source::EventSource;

/// Outcome of one reconciliation tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickSummary {
    /// Events merged into local state
    pub applied: usize,
    /// Entity changes rejected on a version gap
    pub gaps: usize,
    /// Events acknowledged back to the server
    pub acknowledged: usize,
    /// Events replayed from the offline queue on reconnect
    pub replayed: usize,
}

/// Merges the event stream into local state
pub struct Reconciler<S: EventSource> {
    source: S,
    config: ClientConfig,
    /// Locally held version per entity - the gap-detection ledger
    versions: HashMap<(EntityType, String), u64>,
    last_event_id: Option<String>,
    health: ConnectionHealth,
    last_poll_failed: bool,
    /// Entities awaiting an authoritative resync after a gap
    pending_resync: BTreeSet<(EntityType, String)>,
    /// Applied events not yet taken by the UI layer
    applied: Vec<Event>,
}

impl<S: EventSource> Reconciler<S> {
    pub fn new(source: S, config: ClientConfig) -> Self {
        Self {
            source,
            config,
            versions: HashMap::new(),
            last_event_id: None,
            health: ConnectionHealth::default(),
            last_poll_failed: false,
            pending_resync: BTreeSet::new(),
            applied: Vec::new(),
        }
    }

    pub fn health(&self) -> &ConnectionHealth {
        &self.health
    }

    /// Locally held version for an entity, 0 if never seen
    pub fn version_of(&self, entity_type: EntityType, entity_id: &str) -> u64 {
        self.versions
            .get(&(entity_type, entity_id.to_string()))
            .copied()
            .unwrap_or(0)
    }

    /// Applied events accumulated since the last take
    pub fn take_applied(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.applied)
    }

    /// Poll cadence for the next wait
    pub fn next_poll_delay(&self) -> Duration {
        if self.health.connected {
            self.config.poll_interval
        } else {
            self.config.disconnected_poll_interval
        }
    }

    /// One poll-apply-acknowledge pass
    pub async fn tick(&mut self) -> ClientResult<TickSummary> {
        let was_disconnected = !self.health.connected && self.last_poll_failed;
        let started = Instant::now();

        let events = match self.source.poll(self.last_event_id.as_deref()).await {
            Ok(events) => events,
            Err(e) => {
                self.health.connected = false;
                self.health.quality = ConnectionQuality::Offline;
                self.last_poll_failed = true;
                return Err(e);
            }
        };

        let latency = started.elapsed().as_millis() as u64;
        if was_disconnected {
            self.health.reconnect_attempts += 1;
        }
        self.health.connected = true;
        self.health.latency_ms = latency;
        self.health.quality = ConnectionQuality::from_latency_ms(latency);
        self.last_poll_failed = false;

        let mut summary = TickSummary::default();

        // Replay queued events before the live batch after a reconnect
        if was_disconnected {
            let replayed = self.source.drain_offline().await?;
            summary.replayed = replayed.len();
            self.apply_batch(replayed, &mut summary).await?;
        }

        self.apply_batch(events, &mut summary).await?;
        self.process_pending_resyncs().await?;
        Ok(summary)
    }

    async fn apply_batch(
        &mut self,
        events: Vec<Event>,
        summary: &mut TickSummary,
    ) -> ClientResult<()> {
        let mut to_ack = Vec::new();
        for event in events {
            // Defensive redundancy: server-side targeting is authoritative,
            // HIGH/URGENT always pass the local filter
            if let Some(min) = self.config.min_priority
                && event.priority < min
                && !event.priority.bypasses_filters()
            {
                self.last_event_id = Some(event.id.clone());
                continue;
            }

            let mut gapped = false;
            for change in &event.entity_changes {
                let key = (change.entity_type, change.entity_id.clone());
                let local = self.versions.get(&key).copied().unwrap_or(0);
                if change.previous_version != local {
                    // Missed an update for this entity; do not apply, resync
                    tracing::warn!(
                        entity = %change.entity_type,
                        entity_id = %change.entity_id,
                        local,
                        previous = change.previous_version,
                        "Version gap detected, scheduling resync"
                    );
                    self.pending_resync.insert(key);
                    summary.gaps += 1;
                    gapped = true;
                } else {
                    self.versions.insert(key, change.version);
                }
            }

            if event.requires_ack {
                to_ack.push(event.id.clone());
            }
            self.last_event_id = Some(event.id.clone());
            if !gapped {
                summary.applied += 1;
                self.applied.push(event);
            }
        }

        if !to_ack.is_empty() {
            self.source.acknowledge(&to_ack).await?;
            summary.acknowledged += to_ack.len();
        }
        Ok(())
    }

    async fn process_pending_resyncs(&mut self) -> ClientResult<()> {
        let pending: Vec<_> = std::mem::take(&mut self.pending_resync).into_iter().collect();
        for (entity_type, entity_id) in pending {
            match self.source.resync_entity(entity_type, &entity_id).await? {
                Some(version) => {
                    self.versions
                        .insert((entity_type, entity_id), version);
                }
                None => {
                    self.versions.remove(&(entity_type, entity_id));
                }
            }
        }
        Ok(())
    }

    /// Poll until cancelled
    ///
    /// The wait is cancellable at any point; a failed tick only degrades
    /// health and shortens the next delay.
    pub async fn run(&mut self, cancel: &CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.next_poll_delay()) => {
                    if let Err(e) = self.tick().await {
                        tracing::debug!(error = %e, "Poll failed, will retry");
                    }
                }
            }
        }
    }
}
