use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::order::{Order, OrderStatus, Role};
use crate::store::{OrderFilter, OrderStore, StoreResult};

pub const RECENT_ORDERS_LIMIT: usize = 5;

/// Catch-up state handed to a freshly joined connection
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Snapshot {
    #[serde(rename_all = "camelCase")]
    Seller {
        unread_orders: u64,
        pending_orders: u64,
    },
    #[serde(rename_all = "camelCase")]
    Buyer {
        active_orders: u64,
        recent_orders: Vec<OrderSummary>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSummary {
    pub order_id: Uuid,
    pub order_number: String,
    pub status: OrderStatus,
    pub total_price: f64,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderSummary {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            status: order.status,
            total_price: order.total_price(),
            created_at: order.created_at,
        }
    }
}

/// Read the snapshot straight from the store so it reflects every committed write
pub async fn build_snapshot(store: &dyn OrderStore, role: Role, identity_id: &str) -> StoreResult<Snapshot> {
    let party = OrderFilter::for_party(role, identity_id);

    match role {
        Role::Seller => {
            let unread_orders = store.count_by_filter(&party.clone().unread()).await?;
            let pending_orders = store
                .count_by_filter(&party.with_statuses([OrderStatus::Pending]))
                .await?;
            Ok(Snapshot::Seller {
                unread_orders,
                pending_orders,
            })
        }
        Role::Buyer => {
            let active = OrderStatus::ALL.into_iter().filter(OrderStatus::is_active);
            let active_orders = store
                .count_by_filter(&party.clone().with_statuses(active))
                .await?;
            let recent_orders = store
                .find_by_filter(&party, RECENT_ORDERS_LIMIT)
                .await?
                .iter()
                .map(OrderSummary::from)
                .collect();
            Ok(Snapshot::Buyer {
                active_orders,
                recent_orders,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{OrderItem, StatusHistoryEntry, StatusPatch};
    use crate::store::InMemoryOrderStore;

    async fn place(store: &InMemoryOrderStore, number: &str) -> Order {
        let order = Order::new_pending(
            number.to_string(),
            "buyer-1".to_string(),
            "seller-1".to_string(),
            vec![OrderItem::new("sku", 1, 9.5)],
            None,
        );
        store.insert_order(&order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn test_seller_snapshot_counts() {
        let store = InMemoryOrderStore::new();
        let first = place(&store, "ORD-20261019-001").await;
        let second = place(&store, "ORD-20261019-002").await;
        store
            .mark_read_for_seller("seller-1", &[first.id, second.id])
            .await
            .unwrap();
        place(&store, "ORD-20261019-003").await;

        let snapshot = build_snapshot(&store, Role::Seller, "seller-1").await.unwrap();
        assert_eq!(
            snapshot,
            Snapshot::Seller {
                unread_orders: 1,
                pending_orders: 3
            }
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["unreadOrders"], 1);
    }

    #[tokio::test]
    async fn test_buyer_snapshot_reflects_latest_status() {
        let store = InMemoryOrderStore::new();
        let order = place(&store, "ORD-20261019-001").await;

        let patch = StatusPatch {
            to: OrderStatus::Processing,
            history_entry: StatusHistoryEntry {
                status: OrderStatus::Processing,
                changed_by: "seller-1".to_string(),
                changed_at: Utc::now(),
                notes: None,
            },
            cancellation: None,
            delivered_at: None,
        };
        store
            .conditional_update_status(order.id, OrderStatus::Pending, &patch)
            .await
            .unwrap();

        match build_snapshot(&store, Role::Buyer, "buyer-1").await.unwrap() {
            Snapshot::Buyer {
                active_orders,
                recent_orders,
            } => {
                assert_eq!(active_orders, 1);
                assert_eq!(recent_orders[0].status, OrderStatus::Processing);
            }
            other => panic!("unexpected snapshot {:?}", other),
        }
    }
}
