//! Delivery policy table
//!
//! One declarative mapping from event type to delivery defaults, evaluated
//! here and nowhere else. Item-ready and payment-request notifications are
//! always HIGH/URGENT and acknowledgment-gated; routine propagation is
//! NORMAL and fire-and-forget. Callers may override any field explicitly.

use shared::{EventType, Priority, Role};

/// Delivery defaults for one event type
#[derive(Debug, Clone, Copy)]
pub struct DeliveryPolicy {
    pub priority: Priority,
    pub requires_ack: bool,
    /// `None` = every role in the tenant
    pub default_roles: Option<&'static [Role]>,
}

const KITCHEN_FACING: &[Role] = &[Role::Prepara, Role::Supervisore];
const SERVICE_FACING: &[Role] = &[Role::Cameriere, Role::Supervisore];
const CASHIER_FACING: &[Role] = &[Role::Cassa];

/// Resolve the delivery policy for an event type
pub fn policy_for(event_type: EventType) -> DeliveryPolicy {
    match event_type {
        EventType::OrderNew => DeliveryPolicy {
            priority: Priority::Normal,
            requires_ack: false,
            default_roles: Some(KITCHEN_FACING),
        },
        EventType::OrderUpdate => DeliveryPolicy {
            priority: Priority::Normal,
            requires_ack: false,
            default_roles: None,
        },
        EventType::OrderReady => DeliveryPolicy {
            priority: Priority::High,
            requires_ack: true,
            default_roles: Some(SERVICE_FACING),
        },
        EventType::OrderDelivered => DeliveryPolicy {
            priority: Priority::Normal,
            requires_ack: false,
            default_roles: None,
        },
        EventType::PaymentRequested => DeliveryPolicy {
            priority: Priority::High,
            requires_ack: true,
            default_roles: Some(CASHIER_FACING),
        },
        EventType::InventoryExhausted => DeliveryPolicy {
            priority: Priority::Urgent,
            requires_ack: true,
            default_roles: Some(SERVICE_FACING),
        },
        EventType::EntityCreated | EventType::EntityUpdated | EventType::EntityDeleted => {
            DeliveryPolicy {
                priority: Priority::Normal,
                requires_ack: false,
                default_roles: None,
            }
        }
        EventType::BulkUpdate => DeliveryPolicy {
            priority: Priority::Normal,
            requires_ack: false,
            default_roles: None,
        },
    }
}
