//! Shared types for the comanda sync engine
//!
//! These types cross the server/client boundary: events and entity changes,
//! order and line models, roles, consolidated notifications and connection
//! health. Both `comanda-server` and `comanda-client` depend on this crate.

pub mod event;
pub mod health;
pub mod notification;
pub mod order;
pub mod types;

pub use event::{EntityChange, EntityOperation, EntityType, Event, EventType, FieldChange};
pub use health::{ConnectionHealth, ConnectionQuality};
pub use notification::{ConsolidatedNotification, NotificationKind};
pub use order::{ItemStatus, Order, OrderItem, OrderStatus, Station};
pub use types::{Priority, Role, UserRef};
