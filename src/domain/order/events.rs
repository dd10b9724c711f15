use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::aggregate::Order;
use super::value_objects::{OrderStatus, Role};

// ============================================================================
// Order Events - emitted once per committed mutation
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    #[serde(rename = "order.created")]
    Created(OrderCreated),
    #[serde(rename = "order.status.changed")]
    StatusChanged(OrderStatusChanged),
    #[serde(rename = "order.cancelled")]
    Cancelled(OrderCancelled),
    #[serde(rename = "invoice.ready")]
    InvoiceReady(InvoiceReady),
}

impl OrderEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::Created(_) => "order.created",
            OrderEvent::StatusChanged(_) => "order.status.changed",
            OrderEvent::Cancelled(_) => "order.cancelled",
            OrderEvent::InvoiceReady(_) => "invoice.ready",
        }
    }

    pub fn order_id(&self) -> Uuid {
        match self {
            OrderEvent::Created(e) => e.order_id,
            OrderEvent::StatusChanged(e) => e.order_id,
            OrderEvent::Cancelled(e) => e.order_id,
            OrderEvent::InvoiceReady(e) => e.order_id,
        }
    }

    pub fn order_number(&self) -> &str {
        match self {
            OrderEvent::Created(e) => &e.order_number,
            OrderEvent::StatusChanged(e) => &e.order_number,
            OrderEvent::Cancelled(e) => &e.order_number,
            OrderEvent::InvoiceReady(e) => &e.order_number,
        }
    }

    /// Fan-out target: the single (role, identity) that must hear about this event
    pub fn audience(&self) -> (Role, &str) {
        match self {
            OrderEvent::Created(e) => (Role::Seller, &e.seller_id),
            OrderEvent::StatusChanged(e) => (Role::Buyer, &e.buyer_id),
            OrderEvent::Cancelled(e) => match e.cancelled_by {
                Role::Buyer => (Role::Seller, &e.seller_id),
                Role::Seller => (Role::Buyer, &e.buyer_id),
            },
            OrderEvent::InvoiceReady(e) => (Role::Buyer, &e.buyer_id),
        }
    }

    /// The other party, whose summary is attached to the push payload
    pub fn counterpart(&self) -> (Role, &str) {
        let (role, _) = self.audience();
        let other = role.counterpart();
        let identity = match self {
            OrderEvent::Created(e) => party(other, &e.buyer_id, &e.seller_id),
            OrderEvent::StatusChanged(e) => party(other, &e.buyer_id, &e.seller_id),
            OrderEvent::Cancelled(e) => party(other, &e.buyer_id, &e.seller_id),
            OrderEvent::InvoiceReady(e) => party(other, &e.buyer_id, &e.seller_id),
        };
        (other, identity)
    }
}

fn party<'a>(role: Role, buyer_id: &'a str, seller_id: &'a str) -> &'a str {
    match role {
        Role::Buyer => buyer_id,
        Role::Seller => seller_id,
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreated {
    pub order_id: Uuid,
    pub order_number: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub status: OrderStatus,
    pub total_price: f64,
    pub item_count: u64,
    pub created_at: DateTime<Utc>,
}

impl From<&Order> for OrderCreated {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.clone(),
            buyer_id: order.buyer_id.clone(),
            seller_id: order.seller_id.clone(),
            status: order.status,
            total_price: order.total_price(),
            item_count: order.item_count(),
            created_at: order.created_at,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusChanged {
    pub order_id: Uuid,
    pub order_number: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub previous_status: OrderStatus,
    pub status: OrderStatus,
    pub total_price: f64,
    pub notes: Option<String>,
    pub changed_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderCancelled {
    pub order_id: Uuid,
    pub order_number: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub previous_status: OrderStatus,
    pub status: OrderStatus,
    pub total_price: f64,
    pub cancelled_by: Role,
    pub reason: String,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceReady {
    pub order_id: Uuid,
    pub order_number: String,
    pub buyer_id: String,
    pub seller_id: String,
    pub url: String,
    pub generated_at: DateTime<Utc>,
}

impl OrderEvent {
    /// Build the event describing a committed transition of `order` (post-image)
    pub fn for_transition(order: &Order, previous_status: OrderStatus) -> Self {
        match (&order.cancellation_details, order.status) {
            (Some(cancellation), OrderStatus::Cancelled) => OrderEvent::Cancelled(OrderCancelled {
                order_id: order.id,
                order_number: order.order_number.clone(),
                buyer_id: order.buyer_id.clone(),
                seller_id: order.seller_id.clone(),
                previous_status,
                status: order.status,
                total_price: order.total_price(),
                cancelled_by: cancellation.cancelled_by,
                reason: cancellation.reason.clone(),
                cancelled_at: cancellation.cancelled_at,
            }),
            _ => {
                let last = order.status_history.last();
                OrderEvent::StatusChanged(OrderStatusChanged {
                    order_id: order.id,
                    order_number: order.order_number.clone(),
                    buyer_id: order.buyer_id.clone(),
                    seller_id: order.seller_id.clone(),
                    previous_status,
                    status: order.status,
                    total_price: order.total_price(),
                    notes: last.and_then(|entry| entry.notes.clone()),
                    changed_at: last.map(|entry| entry.changed_at).unwrap_or(order.updated_at),
                })
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{CancellationDetails, OrderItem};

    fn order() -> Order {
        Order::new_pending(
            "ORD-20261019-007".to_string(),
            "buyer-1".to_string(),
            "seller-1".to_string(),
            vec![OrderItem::new("sku-1", 2, 4.0)],
            None,
        )
    }

    #[test]
    fn test_created_goes_to_seller_only() {
        let event = OrderEvent::Created(OrderCreated::from(&order()));
        assert_eq!(event.audience(), (Role::Seller, "seller-1"));
        assert_eq!(event.counterpart(), (Role::Buyer, "buyer-1"));
        assert_eq!(event.event_type(), "order.created");
    }

    #[test]
    fn test_status_change_goes_to_buyer() {
        let mut order = order();
        order.status = OrderStatus::Processing;
        let event = OrderEvent::for_transition(&order, OrderStatus::Pending);

        assert!(matches!(event, OrderEvent::StatusChanged(_)));
        assert_eq!(event.audience(), (Role::Buyer, "buyer-1"));
    }

    #[test]
    fn test_cancellation_goes_to_the_other_party() {
        let mut order = order();
        order.status = OrderStatus::Cancelled;
        order.cancellation_details = Some(CancellationDetails {
            cancelled_by: Role::Buyer,
            reason: "late".to_string(),
            cancelled_at: Utc::now(),
        });

        let event = OrderEvent::for_transition(&order, OrderStatus::Pending);
        assert_eq!(event.audience(), (Role::Seller, "seller-1"));

        order.cancellation_details.as_mut().unwrap().cancelled_by = Role::Seller;
        let event = OrderEvent::for_transition(&order, OrderStatus::Pending);
        assert_eq!(event.audience(), (Role::Buyer, "buyer-1"));
    }

    #[test]
    fn test_wire_tag_uses_dotted_names() {
        let event = OrderEvent::Created(OrderCreated::from(&order()));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "order.created");
        assert_eq!(json["data"]["orderNumber"], "ORD-20261019-007");
        assert_eq!(json["data"]["totalPrice"], 8.0);
    }
}
