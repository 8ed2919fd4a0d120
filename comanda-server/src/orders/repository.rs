//! Persistence seam for orders and user lookup
//!
//! The relational store is an external collaborator; the sync engine only
//! ever sees it through [`OrderRepository`], assumed to return transactional,
//! fully-hydrated reads. [`MemoryRepository`] is the in-process
//! implementation used by the binary's standalone mode and the test suites.

use async_trait::async_trait;
use dashmap::DashMap;
use shared::{ItemStatus, Order, OrderStatus, Role, UserRef};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::utils::{AppError, AppResult};

/// Black-box view of the persistent order store
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// All orders for the tenant in one of the given states
    async fn load_active_orders(
        &self,
        tenant_id: &str,
        states: &[OrderStatus],
    ) -> AppResult<Vec<Order>>;

    /// One order by id, `None` if unknown
    async fn load_order(&self, order_id: &str) -> AppResult<Option<Order>>;

    /// Users of the tenant holding one of the given roles
    async fn find_users_by_roles(
        &self,
        tenant_id: &str,
        roles: &[Role],
    ) -> AppResult<Vec<UserRef>>;
}

/// In-memory repository
#[derive(Debug, Default)]
pub struct MemoryRepository {
    orders: DashMap<String, Order>,
    users: DashMap<String, UserRef>,
    /// When set, every read fails - used to exercise sync-failure paths
    fail_reads: AtomicBool,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_order(&self, order: Order) {
        self.orders.insert(order.id.clone(), order);
    }

    pub fn remove_order(&self, order_id: &str) {
        self.orders.remove(order_id);
    }

    pub fn upsert_user(&self, user: UserRef) {
        self.users.insert(user.user_id.clone(), user);
    }

    /// Authoritative line-status write, as the mutation handler would do it
    pub fn set_item_status(&self, order_id: &str, item_id: &str, status: ItemStatus) -> bool {
        let Some(mut order) = self.orders.get_mut(order_id) else {
            return false;
        };
        let now = chrono::Utc::now().timestamp_millis();
        let Some(item) = order.item_mut(item_id) else {
            return false;
        };
        item.set_status(status, now);
        order.updated_at = now;
        order.recompute_total();
        true
    }

    /// Make every subsequent read fail (or succeed again)
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> AppResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            Err(AppError::repository("simulated read failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl OrderRepository for MemoryRepository {
    async fn load_active_orders(
        &self,
        tenant_id: &str,
        states: &[OrderStatus],
    ) -> AppResult<Vec<Order>> {
        self.check_available()?;
        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|o| o.tenant_id == tenant_id && states.contains(&o.status))
            .map(|o| o.clone())
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(orders)
    }

    async fn load_order(&self, order_id: &str) -> AppResult<Option<Order>> {
        self.check_available()?;
        Ok(self.orders.get(order_id).map(|o| o.clone()))
    }

    async fn find_users_by_roles(
        &self,
        tenant_id: &str,
        roles: &[Role],
    ) -> AppResult<Vec<UserRef>> {
        self.check_available()?;
        let _ = tenant_id; // single-tenant user set in the in-memory impl
        Ok(self
            .users
            .iter()
            .filter(|u| roles.contains(&u.role))
            .map(|u| u.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::{OrderItem, Station};

    #[tokio::test]
    async fn test_active_filter_and_tenant_scope() {
        let repo = MemoryRepository::new();
        let mut open = Order::new("t1", "1");
        open.add_item(OrderItem::new("Espresso", 1, Station::Bar, 1.20));
        let mut done = Order::new("t1", "2");
        done.status = OrderStatus::Completed;
        let foreign = Order::new("t2", "3");
        repo.upsert_order(open.clone());
        repo.upsert_order(done);
        repo.upsert_order(foreign);

        let active = repo
            .load_active_orders("t1", &OrderStatus::ACTIVE)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, open.id);
    }

    #[tokio::test]
    async fn test_user_lookup_by_role() {
        let repo = MemoryRepository::new();
        repo.upsert_user(UserRef::new("gino", Role::Cameriere));
        repo.upsert_user(UserRef::new("rita", Role::Cassa));

        let cashiers = repo
            .find_users_by_roles("t1", &[Role::Cassa])
            .await
            .unwrap();
        assert_eq!(cashiers.len(), 1);
        assert_eq!(cashiers[0].user_id, "rita");

        let everyone = repo
            .find_users_by_roles("t1", &Role::ALL)
            .await
            .unwrap();
        assert_eq!(everyone.len(), 2);
    }

    #[tokio::test]
    async fn test_fail_reads_toggle() {
        let repo = MemoryRepository::new();
        repo.set_fail_reads(true);
        assert!(repo.load_order("x").await.is_err());
        repo.set_fail_reads(false);
        assert!(repo.load_order("x").await.unwrap().is_none());
    }
}
