//! Events - immutable facts propagated to connected clients
//!
//! An event is authored once by the broadcast service, then appended to every
//! targeted recipient's stream. Consumers may mark it read or acknowledged
//! but never mutate the payload. Events never cross tenants.

use crate::types::{Priority, Role};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Event type enumeration - closed tag, one per propagated mutation kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventType {
    // Orders
    OrderNew,
    OrderUpdate,
    OrderReady,
    OrderDelivered,

    // Payments
    PaymentRequested,

    // Inventory
    InventoryExhausted,

    // Generic entity propagation
    EntityCreated,
    EntityUpdated,
    EntityDeleted,

    // Many entities in one notification
    BulkUpdate,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventType::OrderNew => write!(f, "ORDER_NEW"),
            EventType::OrderUpdate => write!(f, "ORDER_UPDATE"),
            EventType::OrderReady => write!(f, "ORDER_READY"),
            EventType::OrderDelivered => write!(f, "ORDER_DELIVERED"),
            EventType::PaymentRequested => write!(f, "PAYMENT_REQUESTED"),
            EventType::InventoryExhausted => write!(f, "INVENTORY_EXHAUSTED"),
            EventType::EntityCreated => write!(f, "ENTITY_CREATED"),
            EventType::EntityUpdated => write!(f, "ENTITY_UPDATED"),
            EventType::EntityDeleted => write!(f, "ENTITY_DELETED"),
            EventType::BulkUpdate => write!(f, "BULK_UPDATE"),
        }
    }
}

// ==================== Entity Changes ====================

/// Domain entity kinds subject to version tracking
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityType {
    Order,
    Payment,
    Table,
    InventoryItem,
    /// Running tab / scalar account (tracked outside this core, but its
    /// mutations flow through the same broadcast path)
    Tab,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Order => write!(f, "ORDER"),
            EntityType::Payment => write!(f, "PAYMENT"),
            EntityType::Table => write!(f, "TABLE"),
            EntityType::InventoryItem => write!(f, "INVENTORY_ITEM"),
            EntityType::Tab => write!(f, "TAB"),
        }
    }
}

/// State-transition operation recorded in an [`EntityChange`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityOperation {
    Create,
    Update,
    Delete,
}

/// Single field-level delta, optional detail inside an [`EntityChange`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub field: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<serde_json::Value>,
}

impl FieldChange {
    pub fn new(
        field: impl Into<String>,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
    ) -> Self {
        Self {
            field: field.into(),
            old_value,
            new_value,
        }
    }
}

/// One entity state transition, stamped with tracker versions
///
/// `version` is assigned by the version tracker *after* incrementing, and
/// `previous_version` is always `version - 1`. A consumer holding a local
/// version that does not match `previous_version` has missed an update and
/// must resync the entity instead of applying the change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityChange {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub operation: EntityOperation,
    pub version: u64,
    pub previous_version: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
}

impl EntityChange {
    pub fn new(
        entity_type: EntityType,
        entity_id: impl Into<String>,
        operation: EntityOperation,
        version: u64,
    ) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
            operation,
            version,
            previous_version: version.saturating_sub(1),
            changes: Vec::new(),
        }
    }

    pub fn with_fields(mut self, changes: Vec<FieldChange>) -> Self {
        self.changes = changes;
        self
    }
}

// ==================== Event ====================

/// The atomic unit of propagation
///
/// Authored once, appended per recipient. The `id` is never reused; stream
/// ordering within a recipient is carried by the store's per-recipient
/// sequence, not by id collation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Opaque unique identifier
    pub id: String,
    pub event_type: EventType,
    /// Server timestamp (Unix milliseconds, UTC) - set at creation
    pub timestamp: i64,
    /// Isolation boundary - events never cross tenants
    pub tenant_id: String,
    /// Targeted roles; `None` = every role in the tenant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_roles: Option<Vec<Role>>,
    pub priority: Priority,
    /// Optional grouping key linking causally-related events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entity_changes: Vec<EntityChange>,
    /// If true, the event stays in the offline delivery queue until the
    /// recipient acknowledges it or its TTL expires
    #[serde(default)]
    pub requires_ack: bool,
    /// Discard window in seconds; `None` falls back to the store default
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl_seconds: Option<u64>,
    /// Opaque domain data (order id, table number, amounts, item lists)
    pub payload: serde_json::Value,
}

impl Event {
    /// Create a new event with default priority and no targeting
    pub fn new(
        tenant_id: impl Into<String>,
        event_type: EventType,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            event_type,
            timestamp: chrono::Utc::now().timestamp_millis(),
            tenant_id: tenant_id.into(),
            target_roles: None,
            priority: Priority::Normal,
            correlation_id: None,
            entity_changes: Vec::new(),
            requires_ack: false,
            ttl_seconds: None,
            payload,
        }
    }

    /// Restrict delivery to the given roles
    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        self.target_roles = Some(roles);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_changes(mut self, changes: Vec<EntityChange>) -> Self {
        self.entity_changes = changes;
        self
    }

    pub fn with_ack_required(mut self, requires_ack: bool) -> Self {
        self.requires_ack = requires_ack;
        self
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = Some(ttl_seconds);
        self
    }

    /// Whether this event is targeted at `role`
    ///
    /// Absent `target_roles` means broadcast to all roles.
    pub fn targets_role(&self, role: Role) -> bool {
        match &self.target_roles {
            Some(roles) => roles.contains(&role),
            None => true,
        }
    }

    /// Whether the event is past its discard window at `now_ms`
    pub fn is_expired(&self, now_ms: i64, default_ttl_seconds: u64) -> bool {
        let ttl = self.ttl_seconds.unwrap_or(default_ttl_seconds);
        now_ms.saturating_sub(self.timestamp) > (ttl as i64) * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_builder() {
        let event = Event::new("t1", EventType::OrderNew, serde_json::json!({"table": "12"}))
            .with_roles(vec![Role::Prepara, Role::Supervisore])
            .with_priority(Priority::High)
            .with_ack_required(true);

        assert_eq!(event.tenant_id, "t1");
        assert!(event.targets_role(Role::Prepara));
        assert!(!event.targets_role(Role::Cassa));
        assert!(event.requires_ack);
        assert!(!event.id.is_empty());
    }

    #[test]
    fn test_broadcast_targets_all_roles() {
        let event = Event::new("t1", EventType::BulkUpdate, serde_json::Value::Null);
        for role in Role::ALL {
            assert!(event.targets_role(role));
        }
    }

    #[test]
    fn test_entity_change_previous_version() {
        let change = EntityChange::new(EntityType::Order, "o1", EntityOperation::Create, 1);
        assert_eq!(change.version, 1);
        assert_eq!(change.previous_version, 0);

        let change = EntityChange::new(EntityType::Order, "o1", EntityOperation::Update, 7);
        assert_eq!(change.previous_version, 6);
    }

    #[test]
    fn test_ttl_expiry() {
        let mut event = Event::new("t1", EventType::OrderUpdate, serde_json::Value::Null);
        event.timestamp = 0;

        // Per-event TTL overrides the default
        event.ttl_seconds = Some(10);
        assert!(!event.is_expired(9_000, 300));
        assert!(event.is_expired(11_000, 300));

        // Default TTL applies when unset
        event.ttl_seconds = None;
        assert!(!event.is_expired(299_000, 300));
        assert!(event.is_expired(301_000, 300));
    }

    #[test]
    fn test_wire_tags() {
        let event = Event::new("t1", EventType::PaymentRequested, serde_json::json!({}))
            .with_priority(Priority::Urgent);
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "PAYMENT_REQUESTED");
        assert_eq!(json["priority"], "URGENT");
        // Empty change list stays off the wire
        assert!(json.get("entity_changes").is_none());
    }
}
