//! End-to-end flows over the in-process wiring: waiter submits an order,
//! kitchen readies a line, cashier settles a table, clients reconcile.

use std::sync::Arc;

use async_trait::async_trait;
use comanda_client::{ClientConfig, ClientError, ClientResult, EventSource, Reconciler};
use comanda_server::orders::EntryPhase;
use comanda_server::{Config, MemoryRepository, ServerState};
use shared::{
    EntityOperation, EntityType, Event, EventType, ItemStatus, NotificationKind, Order, OrderItem,
    Priority, Role, Station, UserRef,
};

/// Client transport wired straight into the server state
struct InProcessSource {
    state: ServerState,
    connection_id: String,
}

#[async_trait]
impl EventSource for InProcessSource {
    async fn poll(&self, last_event_id: Option<&str>) -> ClientResult<Vec<Event>> {
        self.state
            .poll_events(&self.connection_id, last_event_id)
            .map_err(|e| ClientError::transport(e.to_string()))
    }

    async fn drain_offline(&self) -> ClientResult<Vec<Event>> {
        Ok(self
            .state
            .drain_offline(&self.connection_id)
            .into_iter()
            .map(|q| (*q.event).clone())
            .collect())
    }

    async fn acknowledge(&self, event_ids: &[String]) -> ClientResult<()> {
        self.state.acknowledge_events(&self.connection_id, event_ids);
        Ok(())
    }

    async fn resync_entity(
        &self,
        entity_type: EntityType,
        entity_id: &str,
    ) -> ClientResult<Option<u64>> {
        let version = self.state.versions.current(entity_type, entity_id);
        Ok((version > 0).then_some(version))
    }
}

fn server() -> (ServerState, Arc<MemoryRepository>) {
    let repo = Arc::new(MemoryRepository::new());
    let config = Config::with_tenant("bar-centrale");
    let state = ServerState::initialize(&config, repo.clone());
    (state, repo)
}

fn espresso_order(repo: &MemoryRepository) -> Order {
    let mut order = Order::new("bar-centrale", "12");
    order.add_item(OrderItem::new("Espresso", 2, Station::Bar, 4.20));
    repo.upsert_order(order.clone());
    order
}

#[tokio::test]
async fn waiter_submission_reaches_kitchen_with_create_version_one() {
    let (state, repo) = server();
    repo.upsert_user(UserRef::new("ugo", Role::Prepara));
    repo.upsert_user(UserRef::new("anna", Role::Supervisore));
    repo.upsert_user(UserRef::new("rita", Role::Cassa));

    // Sessions come up the way a transport adapter builds them: resolve the
    // user's role from the directory, then register the connection
    for user in state.roster(&Role::ALL).await.unwrap() {
        state.connect(&format!("conn-{}", user.user_id), &user.user_id, user.role);
    }

    let order = espresso_order(&repo);
    state.broadcaster.order_created(&order);

    for connection in ["conn-ugo", "conn-anna"] {
        let events = state.poll_events(connection, None).unwrap();
        let new_orders: Vec<&Event> = events
            .iter()
            .filter(|e| e.event_type == EventType::OrderNew)
            .collect();
        assert_eq!(new_orders.len(), 1, "{connection} must see one ORDER_NEW");
        let event = new_orders[0];
        assert_eq!(event.payload["table_number"], "12");
        assert_eq!(event.entity_changes.len(), 1);
        let change = &event.entity_changes[0];
        assert_eq!(change.entity_type, EntityType::Order);
        assert_eq!(change.entity_id, order.id);
        assert_eq!(change.operation, EntityOperation::Create);
        assert_eq!(change.version, 1);
    }

    // Cashier role is outside the ORDER_NEW target set
    let cassa_events = state.poll_events("conn-rita", None).unwrap();
    assert!(cassa_events.iter().all(|e| e.event_type != EventType::OrderNew));
}

#[tokio::test]
async fn ready_line_consolidates_to_one_waiter_notification() {
    let (state, repo) = server();
    state.connect("cam-1", "gino", Role::Cameriere);

    let order = espresso_order(&repo);
    state.orders.sync_orders(true).await.unwrap();

    let item_id = order.items[0].id.clone();
    assert!(state.orders.update_item_status(&order.id, &item_id, ItemStatus::Ready));

    // Optimistic state visible immediately, reconciliation still pending
    assert_eq!(state.orders.cache().phase(&order.id), Some(EntryPhase::Optimistic));

    let notifications = state.consolidated_notifications(Role::Cameriere);
    assert_eq!(notifications.len(), 1);
    let n = &notifications[0];
    assert_eq!(n.kind, NotificationKind::ReadyItems);
    assert_eq!(n.title, "Table 12");
    assert!(n.message.contains("Espresso x2"));
    assert_eq!(n.priority, Priority::High);

    // The fine-grained event reached the waiter's stream too
    let events = state.poll_events("cam-1", None).unwrap();
    assert!(events.iter().any(|e| e.event_type == EventType::OrderReady));
}

#[tokio::test]
async fn payment_request_survives_offline_cashier_until_acknowledged() {
    let (state, repo) = server();
    state.connect("cassa-1", "rita", Role::Cassa);
    state.disconnect("cassa-1");

    let order = espresso_order(&repo);
    let event = state.broadcaster.payment_requested(&order, 8.40);
    assert_eq!(event.priority, Priority::High);
    assert!(event.requires_ack);
    assert_eq!(event.payload["amount"], 8.40);

    // Still queued while the cashier is away
    let status = state.connection_status("cassa-1");
    assert!(!status.connected);
    assert_eq!(status.queue.awaiting_ack, 1);

    // Reconnect: drain, then acknowledge
    state.connect("cassa-1", "rita", Role::Cassa);
    let drained = state.drain_offline("cassa-1");
    assert_eq!(drained.len(), 1);
    assert!(drained[0].delivered);
    assert_eq!(drained[0].event.id, event.id);

    // Drained but unacknowledged entries stay put
    assert_eq!(state.connection_status("cassa-1").queue.awaiting_ack, 1);

    state.acknowledge_events("cassa-1", &[event.id.clone()]);
    assert_eq!(state.connection_status("cassa-1").queue.pending, 0);
    assert!(state.drain_offline("cassa-1").is_empty());
}

#[tokio::test]
async fn client_loop_applies_stream_and_detects_gaps() {
    let (state, repo) = server();
    state.connect("cam-1", "gino", Role::Cameriere);

    let order = espresso_order(&repo);
    state.orders.sync_orders(true).await.unwrap();

    let source = InProcessSource {
        state: state.clone(),
        connection_id: "cam-1".to_string(),
    };
    let mut reconciler = Reconciler::new(source, ClientConfig::default());

    // First mutation flows through cleanly
    let item_id = order.items[0].id.clone();
    state.orders.update_item_status(&order.id, &item_id, ItemStatus::InProgress);
    let summary = reconciler.tick().await.unwrap();
    assert_eq!(summary.gaps, 0);
    assert!(summary.applied >= 1);
    assert!(reconciler.health().connected);
    let seen = reconciler.version_of(EntityType::Order, &order.id);
    assert!(seen >= 1);

    // A version the client never observed: the next change arrives gapped
    state.versions.next(EntityType::Order, &order.id);
    state.orders.update_item_status(&order.id, &item_id, ItemStatus::Ready);
    let summary = reconciler.tick().await.unwrap();
    assert_eq!(summary.gaps, 1);

    // The resync pulled the ledger up to the authoritative version
    assert_eq!(
        reconciler.version_of(EntityType::Order, &order.id),
        state.versions.current(EntityType::Order, &order.id)
    );
}

#[tokio::test]
async fn poll_cursor_prevents_redelivery() {
    let (state, repo) = server();
    state.connect("sup-1", "anna", Role::Supervisore);

    let order = espresso_order(&repo);
    state.broadcaster.order_created(&order);
    let events = state.poll_events("sup-1", None).unwrap();
    assert_eq!(events.len(), 1);
    let cursor = events.last().unwrap().id.clone();

    let mut updated = order.clone();
    updated.status = shared::OrderStatus::AwaitingPayment;
    state.broadcaster.order_status_changed(&updated, order.status);

    let next = state.poll_events("sup-1", Some(&cursor)).unwrap();
    assert_eq!(next.len(), 1);
    assert_eq!(next[0].event_type, EventType::OrderUpdate);
}

#[tokio::test]
async fn full_resync_rolls_back_unconfirmed_optimistic_update() {
    let (state, repo) = server();
    let order = espresso_order(&repo);
    state.orders.sync_orders(true).await.unwrap();

    let item_id = order.items[0].id.clone();
    state.orders.update_item_status(&order.id, &item_id, ItemStatus::Ready);

    // The authoritative write failed downstream; the forced resync is the
    // explicit rollback path
    let phase = state.orders.resync_order(&order.id).await.unwrap();
    assert_eq!(phase, EntryPhase::RolledBack);
    assert_eq!(
        state.orders.cache().get(&order.id).unwrap().items[0].status,
        ItemStatus::Queued
    );

    // No ready-items notification survives the rollback
    let notifications = state.consolidated_notifications(Role::Cameriere);
    assert!(notifications.iter().all(|n| n.kind != NotificationKind::ReadyItems));
}
