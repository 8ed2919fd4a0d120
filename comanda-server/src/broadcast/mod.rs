//! Notification broadcast service
//!
//! The single entry point mutating code calls to publish a domain event.
//! Resolves the recipient set by tenant and role, stamps priority,
//! correlation and entity versions, then fans out into the event store and -
//! for disconnected recipients and acknowledgment-gated events - the offline
//! delivery queue.

pub mod policy;
pub mod registry;

pub use policy::{DeliveryPolicy, policy_for};
pub use registry::{Session, SessionRegistry};

use std::sync::Arc;

use shared::{
    EntityChange, EntityOperation, EntityType, Event, EventType, ItemStatus, Order, OrderItem,
    OrderStatus, Priority, Role,
};

use crate::queue::OfflineQueue;
use crate::store::EventStore;
use crate::versions::VersionTracker;

/// One publication request, before policy resolution
#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    pub tenant_id: String,
    pub event_type: EventType,
    pub payload: serde_json::Value,
    /// Override the policy's default role set
    pub target_roles: Option<Vec<Role>>,
    /// Override the policy's priority
    pub priority: Option<Priority>,
    pub correlation_id: Option<String>,
    pub entity_changes: Vec<EntityChange>,
    /// Override the policy's acknowledgment requirement
    pub requires_ack: Option<bool>,
    pub ttl_seconds: Option<u64>,
}

impl BroadcastRequest {
    pub fn new(
        tenant_id: impl Into<String>,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            event_type,
            payload,
            target_roles: None,
            priority: None,
            correlation_id: None,
            entity_changes: Vec::new(),
            requires_ack: None,
            ttl_seconds: None,
        }
    }

    pub fn roles(mut self, roles: Vec<Role>) -> Self {
        self.target_roles = Some(roles);
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn correlation(mut self, id: impl Into<String>) -> Self {
        self.correlation_id = Some(id.into());
        self
    }

    pub fn changes(mut self, changes: Vec<EntityChange>) -> Self {
        self.entity_changes = changes;
        self
    }

    pub fn requires_ack(mut self, value: bool) -> Self {
        self.requires_ack = Some(value);
        self
    }

    pub fn ttl(mut self, seconds: u64) -> Self {
        self.ttl_seconds = Some(seconds);
        self
    }
}

/// Fan-out service over store + queue + registry
#[derive(Clone)]
pub struct Broadcaster {
    store: Arc<EventStore>,
    queue: Arc<OfflineQueue>,
    versions: Arc<VersionTracker>,
    registry: Arc<SessionRegistry>,
}

impl Broadcaster {
    pub fn new(
        store: Arc<EventStore>,
        queue: Arc<OfflineQueue>,
        versions: Arc<VersionTracker>,
        registry: Arc<SessionRegistry>,
    ) -> Self {
        Self {
            store,
            queue,
            versions,
            registry,
        }
    }

    /// Publish one logical event to every matching recipient
    ///
    /// Policy supplies priority, acknowledgment requirement and the default
    /// role set; explicit request fields win. A tenant with zero matching
    /// recipients is a no-op, not an error. Returns the authored event.
    pub fn broadcast(&self, request: BroadcastRequest) -> Event {
        let policy = policy_for(request.event_type);
        let roles = request
            .target_roles
            .or_else(|| policy.default_roles.map(|r| r.to_vec()));

        let mut event = Event::new(request.tenant_id, request.event_type, request.payload)
            .with_priority(request.priority.unwrap_or(policy.priority))
            .with_ack_required(request.requires_ack.unwrap_or(policy.requires_ack))
            .with_changes(request.entity_changes);
        if let Some(roles) = roles {
            event = event.with_roles(roles);
        }
        if let Some(correlation_id) = request.correlation_id {
            event = event.with_correlation(correlation_id);
        }
        if let Some(ttl) = request.ttl_seconds {
            event = event.with_ttl(ttl);
        }

        let recipients = self
            .registry
            .recipients(&event.tenant_id, event.target_roles.as_deref());
        if recipients.is_empty() {
            tracing::debug!(
                tenant = %event.tenant_id,
                event_type = %event.event_type,
                "No recipients for event, skipping fan-out"
            );
            return event;
        }

        let shared_event = Arc::new(event.clone());
        for session in &recipients {
            self.store.append(
                &session.tenant_id,
                &session.connection_id,
                Arc::clone(&shared_event),
            );
            // Offline recipients replay from the queue; acknowledgment-gated
            // events stay queued until acknowledged even while connected.
            if !session.connected || shared_event.requires_ack {
                self.queue
                    .enqueue(&session.connection_id, Arc::clone(&shared_event));
            }
        }

        tracing::debug!(
            tenant = %event.tenant_id,
            event_type = %event.event_type,
            priority = %event.priority,
            recipients = recipients.len(),
            "Event fanned out"
        );
        event
    }

    // ==================== Domain wrappers ====================

    /// A new order was submitted
    pub fn order_created(&self, order: &Order) -> Event {
        let change = self
            .versions
            .change(EntityType::Order, &order.id, EntityOperation::Create);
        self.broadcast(
            BroadcastRequest::new(
                &order.tenant_id,
                EventType::OrderNew,
                serde_json::json!({
                    "order_id": order.id,
                    "table_number": order.table_number,
                    "items": order.items.iter().map(|i| serde_json::json!({
                        "item_id": i.id,
                        "name": i.name,
                        "quantity": i.quantity,
                        "station": i.station,
                    })).collect::<Vec<_>>(),
                    "total": order.total,
                }),
            )
            .correlation(&order.id)
            .changes(vec![change]),
        )
    }

    /// An order-level status transition
    pub fn order_status_changed(&self, order: &Order, previous: OrderStatus) -> Event {
        let change = self
            .versions
            .change(EntityType::Order, &order.id, EntityOperation::Update)
            .with_fields(vec![shared::FieldChange::new(
                "status",
                serde_json::to_value(previous).ok(),
                serde_json::to_value(order.status).ok(),
            )]);
        self.broadcast(
            BroadcastRequest::new(
                &order.tenant_id,
                EventType::OrderUpdate,
                serde_json::json!({
                    "order_id": order.id,
                    "table_number": order.table_number,
                    "status": order.status,
                }),
            )
            .correlation(&order.id)
            .changes(vec![change]),
        )
    }

    /// A line-level status transition; READY and DELIVERED get their own
    /// event types, everything else is a routine order update
    pub fn item_status_changed(
        &self,
        order: &Order,
        item: &OrderItem,
        previous: ItemStatus,
    ) -> Event {
        let event_type = match item.status {
            ItemStatus::Ready => EventType::OrderReady,
            ItemStatus::Delivered => EventType::OrderDelivered,
            _ => EventType::OrderUpdate,
        };
        let change = self
            .versions
            .change(EntityType::Order, &order.id, EntityOperation::Update)
            .with_fields(vec![shared::FieldChange::new(
                "item_status",
                serde_json::to_value(previous).ok(),
                serde_json::to_value(item.status).ok(),
            )]);
        self.broadcast(
            BroadcastRequest::new(
                &order.tenant_id,
                event_type,
                serde_json::json!({
                    "order_id": order.id,
                    "table_number": order.table_number,
                    "item_id": item.id,
                    "name": item.name,
                    "quantity": item.quantity,
                    "station": item.station,
                    "status": item.status,
                }),
            )
            .correlation(&order.id)
            .changes(vec![change]),
        )
    }

    /// The cashier is asked to settle a table
    pub fn payment_requested(&self, order: &Order, amount: f64) -> Event {
        let payment_id = uuid::Uuid::new_v4().to_string();
        let change =
            self.versions
                .change(EntityType::Payment, &payment_id, EntityOperation::Create);
        self.broadcast(
            BroadcastRequest::new(
                &order.tenant_id,
                EventType::PaymentRequested,
                serde_json::json!({
                    "payment_id": payment_id,
                    "order_id": order.id,
                    "table_number": order.table_number,
                    "amount": amount,
                }),
            )
            .correlation(&order.id)
            .changes(vec![change]),
        )
    }

    /// A product ran out at its station
    pub fn inventory_exhausted(
        &self,
        tenant_id: &str,
        product_id: &str,
        product_name: &str,
    ) -> Event {
        let change = self.versions.change(
            EntityType::InventoryItem,
            product_id,
            EntityOperation::Update,
        );
        self.broadcast(
            BroadcastRequest::new(
                tenant_id,
                EventType::InventoryExhausted,
                serde_json::json!({
                    "product_id": product_id,
                    "name": product_name,
                }),
            )
            .changes(vec![change]),
        )
    }

    /// Generic single-entity propagation
    pub fn entity_changed(
        &self,
        tenant_id: &str,
        entity_type: EntityType,
        entity_id: &str,
        operation: EntityOperation,
        payload: serde_json::Value,
    ) -> Event {
        let event_type = match operation {
            EntityOperation::Create => EventType::EntityCreated,
            EntityOperation::Update => EventType::EntityUpdated,
            EntityOperation::Delete => EventType::EntityDeleted,
        };
        let change = self.versions.change(entity_type, entity_id, operation);
        self.broadcast(
            BroadcastRequest::new(tenant_id, event_type, payload).changes(vec![change]),
        )
    }

    /// Many entities in one notification
    ///
    /// Registers one [`EntityChange`] per affected entity so per-entity
    /// version gaps stay individually detectable.
    pub fn bulk_update(
        &self,
        tenant_id: &str,
        entities: &[(EntityType, String, EntityOperation)],
        payload: serde_json::Value,
    ) -> Event {
        let changes = entities
            .iter()
            .map(|(ty, id, op)| self.versions.change(*ty, id, *op))
            .collect();
        self.broadcast(BroadcastRequest::new(tenant_id, EventType::BulkUpdate, payload).changes(changes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Station;

    fn harness() -> (Broadcaster, Arc<EventStore>, Arc<OfflineQueue>, Arc<SessionRegistry>) {
        let store = Arc::new(EventStore::new(100, 300));
        let queue = Arc::new(OfflineQueue::new(100, 300));
        let versions = Arc::new(VersionTracker::new());
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Broadcaster::new(
            Arc::clone(&store),
            Arc::clone(&queue),
            versions,
            Arc::clone(&registry),
        );
        (broadcaster, store, queue, registry)
    }

    #[test]
    fn test_zero_recipients_is_a_noop() {
        let (broadcaster, store, _, _) = harness();
        let mut order = Order::new("t1", "12");
        order.add_item(OrderItem::new("Espresso", 2, Station::Bar, 1.20));

        let event = broadcaster.order_created(&order);
        assert_eq!(event.entity_changes[0].version, 1);
        assert_eq!(store.stream_len("t1", "anyone"), 0);
    }

    #[test]
    fn test_role_scoped_fan_out() {
        let (broadcaster, store, _, registry) = harness();
        registry.register("prep-1", "t1", "u1", Role::Prepara);
        registry.register("sup-1", "t1", "u2", Role::Supervisore);
        registry.register("cassa-1", "t1", "u3", Role::Cassa);
        registry.register("prep-2", "t2", "u4", Role::Prepara);

        let order = Order::new("t1", "12");
        broadcaster.order_created(&order);

        assert_eq!(store.stream_len("t1", "prep-1"), 1);
        assert_eq!(store.stream_len("t1", "sup-1"), 1);
        // Cashier role is outside the ORDER_NEW default target set
        assert_eq!(store.stream_len("t1", "cassa-1"), 0);
        // Other tenant never sees it
        assert_eq!(store.stream_len("t2", "prep-2"), 0);
    }

    #[test]
    fn test_ack_gated_event_queues_even_when_connected() {
        let (broadcaster, _, queue, registry) = harness();
        registry.register("cassa-1", "t1", "u1", Role::Cassa);

        let order = Order::new("t1", "12");
        let event = broadcaster.payment_requested(&order, 8.40);

        assert_eq!(event.priority, Priority::High);
        assert!(event.requires_ack);
        let pending = queue.drain("cassa-1");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event.id, event.id);
    }

    #[test]
    fn test_disconnected_recipient_gets_queued_routine_events() {
        let (broadcaster, store, queue, registry) = harness();
        registry.register("cam-1", "t1", "u1", Role::Cameriere);
        registry.mark_disconnected("cam-1");

        let mut order = Order::new("t1", "12");
        let previous = order.status;
        order.status = OrderStatus::AwaitingPayment;
        broadcaster.order_status_changed(&order, previous);

        assert_eq!(store.stream_len("t1", "cam-1"), 1);
        assert_eq!(queue.drain("cam-1").len(), 1);
    }

    #[test]
    fn test_bulk_update_registers_one_change_per_entity() {
        let (broadcaster, _, _, registry) = harness();
        registry.register("sup-1", "t1", "u1", Role::Supervisore);

        let entities = vec![
            (EntityType::Order, "o1".to_string(), EntityOperation::Update),
            (EntityType::Order, "o2".to_string(), EntityOperation::Update),
            (EntityType::Table, "12".to_string(), EntityOperation::Update),
        ];
        let event = broadcaster.bulk_update("t1", &entities, serde_json::json!({}));

        assert_eq!(event.entity_changes.len(), 3);
        let order_changes: Vec<_> = event
            .entity_changes
            .iter()
            .filter(|c| c.entity_type == EntityType::Order)
            .collect();
        assert_eq!(order_changes.len(), 2);
        // Per-entity counters, each starting at 1
        assert!(order_changes.iter().all(|c| c.version == 1));
    }

    #[test]
    fn test_explicit_overrides_beat_policy() {
        let (broadcaster, _, queue, registry) = harness();
        registry.register("sup-1", "t1", "u1", Role::Supervisore);

        let event = broadcaster.broadcast(
            BroadcastRequest::new("t1", EventType::OrderUpdate, serde_json::json!({}))
                .priority(Priority::Urgent)
                .requires_ack(true)
                .roles(vec![Role::Supervisore]),
        );

        assert_eq!(event.priority, Priority::Urgent);
        assert!(event.requires_ack);
        assert_eq!(queue.drain("sup-1").len(), 1);
    }
}
