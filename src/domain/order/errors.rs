use uuid::Uuid;

use super::value_objects::{OrderStatus, Role};
use crate::store::StoreError;

// ============================================================================
// Order Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Another writer changed the status first; retrying with fresh state is safe
    #[error("Order {order_id} is no longer {expected}")]
    Conflict { order_id: Uuid, expected: OrderStatus },

    #[error("Unknown {role}: {identity_id}")]
    IdentityNotFound { role: Role, identity_id: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderError {
    /// Stable code sent to realtime clients alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "VALIDATION_ERROR",
            OrderError::NotFound(_) => "NOT_FOUND",
            OrderError::Unauthorized(_) => "UNAUTHORIZED",
            OrderError::InvalidTransition { .. } => "INVALID_TRANSITION",
            OrderError::Conflict { .. } => "CONFLICT",
            OrderError::IdentityNotFound { .. } => "IDENTITY_NOT_FOUND",
            OrderError::Store(_) => "STORE_ERROR",
        }
    }

    /// Label used for the rejection counter
    pub fn reason(&self) -> &'static str {
        match self {
            OrderError::Validation(_) => "validation",
            OrderError::NotFound(_) => "not_found",
            OrderError::Unauthorized(_) => "unauthorized",
            OrderError::InvalidTransition { .. } => "invalid_transition",
            OrderError::Conflict { .. } => "conflict",
            OrderError::IdentityNotFound { .. } => "identity_not_found",
            OrderError::Store(_) => "store",
        }
    }
}
