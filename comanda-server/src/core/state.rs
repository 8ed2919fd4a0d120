//! Server state - the singleton wiring of every broker service
//!
//! Holds the injectable store objects (version tracker, event store, offline
//! queue, session registry) plus the broadcaster, sync service and
//! consolidator built on top of them. Constructed once at process start and
//! passed by reference; `Clone` is a shallow `Arc` copy.
//!
//! The surface exposed to the transport adapter lives here: connect /
//! disconnect, poll, drain, acknowledge, consolidated notifications,
//! connection status and the manual full-sync trigger.

use std::sync::Arc;

use serde::Serialize;
use shared::{ConsolidatedNotification, Event, Role, UserRef};

use crate::broadcast::{Broadcaster, SessionRegistry};
use crate::consolidate::Consolidator;
use crate::core::Config;
use crate::core::tasks::{BackgroundTasks, TaskKind};
use crate::orders::{ActiveOrderCache, OrderRepository, OrdersSyncService, SyncReport};
use crate::queue::{OfflineQueue, QueueHealth, QueuedEvent};
use crate::store::EventStore;
use crate::utils::{AppError, AppResult};
use crate::versions::VersionTracker;

/// Server-side view of one connection's delivery state
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    pub reconnect_attempts: u32,
    pub queue: QueueHealth,
}

/// Shared references to every broker service
#[derive(Clone)]
pub struct ServerState {
    pub config: Config,
    pub versions: Arc<VersionTracker>,
    pub store: Arc<EventStore>,
    pub queue: Arc<OfflineQueue>,
    pub registry: Arc<SessionRegistry>,
    pub broadcaster: Broadcaster,
    pub orders: Arc<OrdersSyncService>,
    pub consolidator: Consolidator,
    repo: Arc<dyn OrderRepository>,
    /// Unique instance id generated on startup; a changed epoch tells
    /// clients the broker restarted and every stream was lost
    epoch: String,
}

impl ServerState {
    /// Wire every service against the given repository
    pub fn initialize(config: &Config, repo: Arc<dyn OrderRepository>) -> Self {
        let versions = Arc::new(VersionTracker::new());
        let store = Arc::new(EventStore::new(
            config.max_events_per_recipient,
            config.event_ttl_seconds,
        ));
        let queue = Arc::new(OfflineQueue::new(
            config.offline_queue_capacity,
            config.event_ttl_seconds,
        ));
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Broadcaster::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            Arc::clone(&versions),
            Arc::clone(&registry),
        );
        let cache = Arc::new(ActiveOrderCache::new());
        let orders = Arc::new(OrdersSyncService::new(
            config.tenant_id.clone(),
            Arc::clone(&repo),
            Arc::clone(&cache),
            broadcaster.clone(),
            config.sync_settings(),
        ));
        let consolidator = Consolidator::new(cache, config.age_thresholds());
        let epoch = uuid::Uuid::new_v4().to_string();
        tracing::info!(epoch = %epoch, tenant = %config.tenant_id, "Server state initialized");

        Self {
            config: config.clone(),
            versions,
            store,
            queue,
            registry,
            broadcaster,
            orders,
            consolidator,
            repo,
            epoch,
        }
    }

    /// Unique instance id generated on startup
    pub fn epoch(&self) -> &str {
        &self.epoch
    }

    // ==================== Session lifecycle ====================

    /// Users of this tenant holding one of the given roles
    ///
    /// Transport adapters use this to resolve a logging-in user's role
    /// before registering the session.
    pub async fn roster(&self, roles: &[Role]) -> AppResult<Vec<UserRef>> {
        self.repo
            .find_users_by_roles(&self.config.tenant_id, roles)
            .await
    }

    /// Register a connection, or flag a known one reconnected
    pub fn connect(&self, connection_id: &str, user_id: &str, role: Role) {
        if self.registry.get(connection_id).is_some() {
            self.registry.mark_connected(connection_id);
        } else {
            self.registry
                .register(connection_id, &self.config.tenant_id, user_id, role);
        }
    }

    /// Flag a connection offline; its queue keeps accumulating for replay
    pub fn disconnect(&self, connection_id: &str) {
        self.registry.mark_disconnected(connection_id);
    }

    /// Drop the session and its replay queue entirely
    pub fn remove_session(&self, connection_id: &str) {
        self.registry.remove(connection_id);
        self.queue.remove_connection(connection_id);
    }

    // ==================== Delivery surface ====================

    /// Unread events for a connection, optionally after a cursor
    pub fn poll_events(
        &self,
        connection_id: &str,
        last_event_id: Option<&str>,
    ) -> AppResult<Vec<Event>> {
        let session = self
            .registry
            .get(connection_id)
            .ok_or_else(|| AppError::not_found(format!("Unknown connection {connection_id}")))?;
        Ok(self
            .store
            .get_unread(&session.tenant_id, connection_id, last_event_id))
    }

    /// Pending replay entries; called before resuming live consumption
    pub fn drain_offline(&self, connection_id: &str) -> Vec<QueuedEvent> {
        self.queue.drain(connection_id)
    }

    /// Acknowledge delivered events and flag them read
    pub fn acknowledge_events(&self, connection_id: &str, event_ids: &[String]) {
        for event_id in event_ids {
            self.queue.acknowledge(connection_id, event_id);
        }
        if let Some(session) = self.registry.get(connection_id) {
            self.store
                .mark_read(&session.tenant_id, connection_id, event_ids);
        }
    }

    /// Delivery-side health for one connection
    pub fn connection_status(&self, connection_id: &str) -> ConnectionStatus {
        let session = self.registry.get(connection_id);
        ConnectionStatus {
            connected: session.as_ref().map(|s| s.connected).unwrap_or(false),
            reconnect_attempts: session.map(|s| s.reconnects).unwrap_or(0),
            queue: self.queue.health_snapshot(connection_id),
        }
    }

    // ==================== Read-side surface ====================

    /// Consolidated notifications for a role, evaluated now
    pub fn consolidated_notifications(&self, role: Role) -> Vec<ConsolidatedNotification> {
        self.consolidator
            .notifications_for_role(role, chrono::Utc::now().timestamp_millis())
    }

    /// Manual "refresh" action from the UI
    pub async fn force_full_sync(&self) -> AppResult<SyncReport> {
        self.orders.sync_orders(true).await
    }

    // ==================== Background tasks ====================

    /// Register the sync timers and the TTL sweeper
    pub fn start_background_tasks(&self, tasks: &mut BackgroundTasks) {
        OrdersSyncService::spawn_timers(Arc::clone(&self.orders), tasks);

        let token = tasks.shutdown_token();
        let store = Arc::clone(&self.store);
        let queue = Arc::clone(&self.queue);
        let interval = std::time::Duration::from_secs(self.config.sweep_interval_secs);
        tasks.spawn("ttl_sweeper", TaskKind::Worker, async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        store.sweep_expired();
                        queue.sweep_expired();
                    }
                }
            }
        });
    }

    /// Startup summary for the logs
    pub fn log_startup_banner(&self) {
        tracing::info!("════════════════════════════════════════");
        tracing::info!("  COMANDA SYNC SERVER");
        tracing::info!("  Tenant      : {}", self.config.tenant_id);
        tracing::info!("  Epoch       : {}", self.epoch);
        tracing::info!("  Environment : {}", self.config.environment);
        tracing::info!("  Event TTL   : {}s", self.config.event_ttl_seconds);
        tracing::info!("════════════════════════════════════════");
    }
}
