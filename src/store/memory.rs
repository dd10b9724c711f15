use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::{
    order_number_suffix, ConditionalUpdate, DailyCounter, IdentityStore, IdentitySummary,
    OrderFilter, OrderStore, StoreError, StoreResult,
};
use crate::domain::order::{Invoice, Order, OrderStatus, Role, StatusPatch};

// ============================================================================
// In-Memory Stores
// ============================================================================
//
// Process-local implementations of the collaborator traits. The order store
// serialises writers behind one RwLock, so the status compare-and-set and the
// order-number uniqueness check are atomic with respect to each other.
//
// ============================================================================

#[derive(Default)]
struct OrderTables {
    orders: HashMap<Uuid, Order>,
    numbers: HashMap<String, Uuid>,
}

#[derive(Default)]
pub struct InMemoryOrderStore {
    tables: RwLock<OrderTables>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tables.read().await.orders.len()
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn find_max_order_number_for_prefix(&self, prefix: &str) -> StoreResult<Option<String>> {
        let tables = self.tables.read().await;
        Ok(tables
            .numbers
            .keys()
            .filter(|number| number.starts_with(prefix))
            .max_by_key(|number| order_number_suffix(number))
            .cloned())
    }

    async fn exists_order_number(&self, order_number: &str) -> StoreResult<bool> {
        Ok(self.tables.read().await.numbers.contains_key(order_number))
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.numbers.contains_key(&order.order_number) {
            return Err(StoreError::DuplicateOrderNumber(order.order_number.clone()));
        }
        tables.numbers.insert(order.order_number.clone(), order.id);
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn find_order(&self, order_id: Uuid) -> StoreResult<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&order_id).cloned())
    }

    async fn conditional_update_status(
        &self,
        order_id: Uuid,
        expected_from: OrderStatus,
        patch: &StatusPatch,
    ) -> StoreResult<ConditionalUpdate> {
        let mut tables = self.tables.write().await;
        let Some(order) = tables.orders.get_mut(&order_id) else {
            return Ok(ConditionalUpdate::NotFound);
        };

        if order.status != expected_from {
            return Ok(ConditionalUpdate::Conflict);
        }

        order.apply_patch(patch);
        Ok(ConditionalUpdate::Applied(order.clone()))
    }

    async fn count_by_filter(&self, filter: &OrderFilter) -> StoreResult<u64> {
        let tables = self.tables.read().await;
        Ok(tables.orders.values().filter(|order| filter.matches(order)).count() as u64)
    }

    async fn find_by_filter(&self, filter: &OrderFilter, limit: usize) -> StoreResult<Vec<Order>> {
        let tables = self.tables.read().await;
        let mut orders: Vec<Order> = tables
            .orders
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        orders.truncate(limit);
        Ok(orders)
    }

    async fn mark_read_for_seller(&self, seller_id: &str, order_ids: &[Uuid]) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let mut changed = 0;
        for order_id in order_ids {
            if let Some(order) = tables.orders.get_mut(order_id) {
                if order.seller_id == seller_id && !order.is_read {
                    order.is_read = true;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn set_invoice(&self, order_id: Uuid, invoice: &Invoice) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let order = tables
            .orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::Backend(format!("order {} not found", order_id)))?;
        order.invoice = Some(invoice.clone());
        Ok(())
    }
}

/// Identity directory seeded up front
#[derive(Default)]
pub struct InMemoryIdentityStore {
    identities: DashMap<(Role, String), IdentitySummary>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, role: Role, identity_id: impl Into<String>, summary: IdentitySummary) {
        self.identities.insert((role, identity_id.into()), summary);
    }

    pub fn with_identity(self, role: Role, identity_id: &str, display_name: &str) -> Self {
        self.insert(
            role,
            identity_id,
            IdentitySummary {
                display_name: display_name.to_string(),
                email: None,
            },
        );
        self
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn exists(&self, role: Role, identity_id: &str) -> StoreResult<bool> {
        Ok(self.identities.contains_key(&(role, identity_id.to_string())))
    }

    async fn get_summary(&self, role: Role, identity_id: &str) -> StoreResult<Option<IdentitySummary>> {
        Ok(self
            .identities
            .get(&(role, identity_id.to_string()))
            .map(|entry| entry.value().clone()))
    }
}

#[derive(Default)]
pub struct InMemoryDailyCounter {
    counters: Mutex<HashMap<String, u32>>,
}

impl InMemoryDailyCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DailyCounter for InMemoryDailyCounter {
    async fn increment(&self, day: &str) -> StoreResult<u32> {
        let mut counters = self.counters.lock().await;
        let seq = counters.entry(day.to_string()).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderItem, StatusHistoryEntry};
    use chrono::Utc;

    fn order(number: &str) -> Order {
        Order::new_pending(
            number.to_string(),
            "buyer-1".to_string(),
            "seller-1".to_string(),
            vec![OrderItem::new("sku-1", 1, 3.0)],
            None,
        )
    }

    fn patch(to: OrderStatus) -> StatusPatch {
        StatusPatch {
            to,
            history_entry: StatusHistoryEntry {
                status: to,
                changed_by: "seller-1".to_string(),
                changed_at: Utc::now(),
                notes: None,
            },
            cancellation: None,
            delivered_at: None,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_numbers() {
        let store = InMemoryOrderStore::new();
        store.insert_order(&order("ORD-20261019-001")).await.unwrap();

        let err = store.insert_order(&order("ORD-20261019-001")).await.unwrap_err();
        assert!(matches!(err, StoreError::DuplicateOrderNumber(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_max_lookup_is_numeric_and_prefix_scoped() {
        let store = InMemoryOrderStore::new();
        for number in ["ORD-20261019-999", "ORD-20261019-1000", "ORD-20261018-500"] {
            store.insert_order(&order(number)).await.unwrap();
        }

        let max = store.find_max_order_number_for_prefix("ORD-20261019-").await.unwrap();
        assert_eq!(max.as_deref(), Some("ORD-20261019-1000"));

        let none = store.find_max_order_number_for_prefix("ORD-20261020-").await.unwrap();
        assert!(none.is_none());
    }

    #[tokio::test]
    async fn test_conditional_update_applies_once() {
        let store = InMemoryOrderStore::new();
        let order = order("ORD-20261019-001");
        store.insert_order(&order).await.unwrap();

        let first = store
            .conditional_update_status(order.id, OrderStatus::Pending, &patch(OrderStatus::Processing))
            .await
            .unwrap();
        assert!(matches!(first, ConditionalUpdate::Applied(ref o) if o.status_history.len() == 2));

        let second = store
            .conditional_update_status(order.id, OrderStatus::Pending, &patch(OrderStatus::Processing))
            .await
            .unwrap();
        assert!(matches!(second, ConditionalUpdate::Conflict));

        let missing = store
            .conditional_update_status(Uuid::new_v4(), OrderStatus::Pending, &patch(OrderStatus::Processing))
            .await
            .unwrap();
        assert!(matches!(missing, ConditionalUpdate::NotFound));
    }

    #[tokio::test]
    async fn test_mark_read_for_seller() {
        let store = InMemoryOrderStore::new();
        let first = order("ORD-20261019-001");
        let second = order("ORD-20261019-002");
        store.insert_order(&first).await.unwrap();
        store.insert_order(&second).await.unwrap();

        let unread = OrderFilter::for_party(Role::Seller, "seller-1").unread();
        assert_eq!(store.count_by_filter(&unread).await.unwrap(), 2);
        assert_eq!(store.mark_read_for_seller("seller-1", &[first.id]).await.unwrap(), 1);
        assert_eq!(store.count_by_filter(&unread).await.unwrap(), 1);

        // Other sellers' ids and already-read orders are left alone
        assert_eq!(store.mark_read_for_seller("seller-2", &[second.id]).await.unwrap(), 0);
        assert_eq!(store.mark_read_for_seller("seller-1", &[first.id, second.id]).await.unwrap(), 1);
        assert_eq!(store.count_by_filter(&unread).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_counter_is_scoped_by_day() {
        let counter = InMemoryDailyCounter::new();
        assert_eq!(counter.increment("20261019").await.unwrap(), 1);
        assert_eq!(counter.increment("20261019").await.unwrap(), 2);
        assert_eq!(counter.increment("20261020").await.unwrap(), 1);
    }
}
