use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};

use super::value_objects::{
    CancellationDetails, Invoice, OrderItem, OrderStatus, Role, StatusHistoryEntry,
};

// ============================================================================
// Order Aggregate - the persisted order document
// ============================================================================
//
// Created once at placement (Pending, one history entry) and afterwards
// mutated only by applying a StatusPatch produced by the state machine.
// Orders are never deleted; status_history is the audit trail.
//
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    // Identity
    pub id: Uuid,
    pub order_number: String,

    // Parties
    pub buyer_id: String,
    pub seller_id: String,

    // Contents (immutable after creation)
    pub items: Vec<OrderItem>,

    // Lifecycle
    pub status: OrderStatus,
    pub status_history: Vec<StatusHistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancellation_details: Option<CancellationDetails>,

    // Seller-side "seen" flag, outside the state machine
    #[serde(default)]
    pub is_read: bool,

    #[serde(default)]
    pub is_delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice: Option<Invoice>,

    // Audit Trail
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The set of changes one committed transition makes to an order
#[derive(Debug, Clone, PartialEq)]
pub struct StatusPatch {
    pub to: OrderStatus,
    pub history_entry: StatusHistoryEntry,
    pub cancellation: Option<CancellationDetails>,
    pub delivered_at: Option<DateTime<Utc>>,
}

impl Order {
    /// Build a freshly placed order with its seed history entry
    pub fn new_pending(
        order_number: String,
        buyer_id: String,
        seller_id: String,
        items: Vec<OrderItem>,
        notes: Option<String>,
    ) -> Self {
        let now = Utc::now();
        let history_entry = StatusHistoryEntry {
            status: OrderStatus::Pending,
            changed_by: buyer_id.clone(),
            changed_at: now,
            notes: notes.or_else(|| Some("Order placed".to_string())),
        };

        Self {
            id: Uuid::now_v7(),
            order_number,
            buyer_id,
            seller_id,
            items,
            status: OrderStatus::Pending,
            status_history: vec![history_entry],
            cancellation_details: None,
            is_read: false,
            is_delivered: false,
            delivered_at: None,
            invoice: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn total_price(&self) -> f64 {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    /// Quantities are validated positive; summed wide so large lines cannot overflow
    pub fn item_count(&self) -> u64 {
        self.items
            .iter()
            .map(|item| u64::try_from(item.quantity).unwrap_or(0))
            .sum()
    }

    /// Identity that holds `role` on this order
    pub fn party(&self, role: Role) -> &str {
        match role {
            Role::Buyer => &self.buyer_id,
            Role::Seller => &self.seller_id,
        }
    }

    pub fn is_owned_by(&self, role: Role, identity_id: &str) -> bool {
        self.party(role) == identity_id
    }

    /// Apply a committed transition. History only ever grows.
    pub fn apply_patch(&mut self, patch: &StatusPatch) {
        self.status = patch.to;
        self.status_history.push(patch.history_entry.clone());
        self.updated_at = patch.history_entry.changed_at;

        if let Some(ref cancellation) = patch.cancellation {
            self.cancellation_details = Some(cancellation.clone());
        }

        if let Some(delivered_at) = patch.delivered_at {
            self.is_delivered = true;
            self.delivered_at = Some(delivered_at);
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_order() -> Order {
        Order::new_pending(
            "ORD-20261019-001".to_string(),
            "buyer-1".to_string(),
            "seller-1".to_string(),
            vec![
                OrderItem::new("sku-1", 2, 10.0),
                OrderItem::new("sku-2", 1, 5.5).with_color("red"),
            ],
            None,
        )
    }

    #[test]
    fn test_new_order_is_pending_with_seed_history() {
        let order = sample_order();

        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.status_history.len(), 1);
        assert_eq!(order.status_history[0].status, OrderStatus::Pending);
        assert_eq!(order.status_history[0].changed_by, "buyer-1");
        assert!(!order.is_read);
        assert!(order.cancellation_details.is_none());
        assert!(order.invoice.is_none());
    }

    #[test]
    fn test_totals() {
        let order = sample_order();
        assert_eq!(order.total_price(), 25.5);
        assert_eq!(order.item_count(), 3);
    }

    #[test]
    fn test_item_count_beyond_i32() {
        let mut order = sample_order();
        order.items = vec![OrderItem::new("bulk", i32::MAX, 0.01), OrderItem::new("extra", 1, 0.01)];
        assert_eq!(order.item_count(), i32::MAX as u64 + 1);
    }

    #[test]
    fn test_ownership() {
        let order = sample_order();
        assert!(order.is_owned_by(Role::Buyer, "buyer-1"));
        assert!(order.is_owned_by(Role::Seller, "seller-1"));
        assert!(!order.is_owned_by(Role::Seller, "buyer-1"));
    }

    #[test]
    fn test_apply_patch_appends_history_and_sets_delivery() {
        let mut order = sample_order();
        let delivered_at = Utc::now();

        order.apply_patch(&StatusPatch {
            to: OrderStatus::Delivered,
            history_entry: StatusHistoryEntry {
                status: OrderStatus::Delivered,
                changed_by: "seller-1".to_string(),
                changed_at: delivered_at,
                notes: None,
            },
            cancellation: None,
            delivered_at: Some(delivered_at),
        });

        assert_eq!(order.status, OrderStatus::Delivered);
        assert_eq!(order.status_history.len(), 2);
        assert!(order.is_delivered);
        assert_eq!(order.delivered_at, Some(delivered_at));
    }

    #[test]
    fn test_document_round_trips_as_camel_case() {
        let order = sample_order();
        let json = serde_json::to_value(&order).unwrap();

        assert_eq!(json["orderNumber"], "ORD-20261019-001");
        assert_eq!(json["statusHistory"].as_array().unwrap().len(), 1);
        assert!(json.get("cancellationDetails").is_none());

        let back: Order = serde_json::from_value(json).unwrap();
        assert_eq!(back, order);
    }
}
