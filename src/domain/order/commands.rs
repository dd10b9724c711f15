use uuid::Uuid;

use super::errors::OrderError;
use super::value_objects::{OrderItem, OrderStatus, Role};

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================

/// Placement of a new order by a buyer
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub buyer_id: String,
    pub seller_id: String,
    pub items: Vec<OrderItem>,
    pub notes: Option<String>,
}

impl NewOrder {
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.buyer_id.trim().is_empty() || self.seller_id.trim().is_empty() {
            return Err(OrderError::Validation(
                "buyer and seller ids are required".to_string(),
            ));
        }

        if self.items.is_empty() {
            return Err(OrderError::Validation(
                "order must contain at least one item".to_string(),
            ));
        }

        for (index, item) in self.items.iter().enumerate() {
            if item.product_ref.trim().is_empty() {
                return Err(OrderError::Validation(format!(
                    "item {} has no product reference",
                    index
                )));
            }
            if item.quantity <= 0 {
                return Err(OrderError::Validation(format!(
                    "item {} has non-positive quantity {}",
                    index, item.quantity
                )));
            }
            if !item.unit_price.is_finite() || item.unit_price < 0.0 {
                return Err(OrderError::Validation(format!(
                    "item {} has invalid unit price {}",
                    index, item.unit_price
                )));
            }
        }

        Ok(())
    }
}

/// A buyer or seller asking to move an order to another status
#[derive(Debug, Clone)]
pub struct ChangeStatus {
    pub order_id: Uuid,
    pub target: OrderStatus,
    pub actor_role: Role,
    pub actor_id: String,
    pub notes: Option<String>,
}

impl ChangeStatus {
    pub fn cancel(order_id: Uuid, actor_role: Role, actor_id: impl Into<String>, reason: Option<String>) -> Self {
        Self {
            order_id,
            target: OrderStatus::Cancelled,
            actor_role,
            actor_id: actor_id.into(),
            notes: reason,
        }
    }
}
