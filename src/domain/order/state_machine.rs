use chrono::{DateTime, Utc};

use super::aggregate::{Order, StatusPatch};
use super::errors::OrderError;
use super::value_objects::{CancellationDetails, OrderStatus, Role, StatusHistoryEntry};

// ============================================================================
// Order State Machine
// ============================================================================
//
//   Pending ──► Processing ──► Shipped ──► Delivered
//      │             │
//      └─────┬───────┘
//            ▼
//        Cancelled
//
// Anything not in TRANSITIONS is rejected. Planning is pure: it validates
// ownership, then the table, and returns the patch the store must apply
// with a compare-and-set on the current status.
//
// ============================================================================

pub const DEFAULT_CANCEL_REASON: &str = "No reason provided";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    None,
    MarkDelivered,
    RecordCancellation,
}

#[derive(Debug, Clone, Copy)]
pub struct TransitionRule {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub allowed: &'static [Role],
    pub side_effect: SideEffect,
}

const SELLER_ONLY: &[Role] = &[Role::Seller];
const EITHER_PARTY: &[Role] = &[Role::Buyer, Role::Seller];

pub const TRANSITIONS: [TransitionRule; 5] = [
    TransitionRule {
        from: OrderStatus::Pending,
        to: OrderStatus::Processing,
        allowed: SELLER_ONLY,
        side_effect: SideEffect::None,
    },
    TransitionRule {
        from: OrderStatus::Processing,
        to: OrderStatus::Shipped,
        allowed: SELLER_ONLY,
        side_effect: SideEffect::None,
    },
    TransitionRule {
        from: OrderStatus::Shipped,
        to: OrderStatus::Delivered,
        allowed: SELLER_ONLY,
        side_effect: SideEffect::MarkDelivered,
    },
    TransitionRule {
        from: OrderStatus::Pending,
        to: OrderStatus::Cancelled,
        allowed: EITHER_PARTY,
        side_effect: SideEffect::RecordCancellation,
    },
    TransitionRule {
        from: OrderStatus::Processing,
        to: OrderStatus::Cancelled,
        allowed: EITHER_PARTY,
        side_effect: SideEffect::RecordCancellation,
    },
];

pub fn rule_for(from: OrderStatus, to: OrderStatus) -> Option<&'static TransitionRule> {
    TRANSITIONS.iter().find(|rule| rule.from == from && rule.to == to)
}

/// A requested status change, as issued by a buyer or seller
#[derive(Debug, Clone)]
pub struct TransitionRequest<'a> {
    pub target: OrderStatus,
    pub actor_role: Role,
    pub actor_id: &'a str,
    pub notes: Option<String>,
}

/// Validate a request against the current order and build the patch
pub fn plan_transition(
    order: &Order,
    request: &TransitionRequest<'_>,
    now: DateTime<Utc>,
) -> Result<StatusPatch, OrderError> {
    if !order.is_owned_by(request.actor_role, request.actor_id) {
        return Err(OrderError::Unauthorized(format!(
            "{} {} does not own order {}",
            request.actor_role, request.actor_id, order.order_number
        )));
    }

    let rule = rule_for(order.status, request.target).ok_or(OrderError::InvalidTransition {
        from: order.status,
        to: request.target,
    })?;

    if !rule.allowed.contains(&request.actor_role) {
        return Err(OrderError::Unauthorized(format!(
            "a {} may not move an order from {} to {}",
            request.actor_role, rule.from, rule.to
        )));
    }

    let history_entry = StatusHistoryEntry {
        status: rule.to,
        changed_by: request.actor_id.to_string(),
        changed_at: now,
        notes: request.notes.clone(),
    };

    let patch = match rule.side_effect {
        SideEffect::None => StatusPatch {
            to: rule.to,
            history_entry,
            cancellation: None,
            delivered_at: None,
        },
        SideEffect::MarkDelivered => StatusPatch {
            to: rule.to,
            history_entry,
            cancellation: None,
            delivered_at: Some(now),
        },
        SideEffect::RecordCancellation => {
            let reason = request
                .notes
                .as_deref()
                .map(str::trim)
                .filter(|reason| !reason.is_empty())
                .unwrap_or(DEFAULT_CANCEL_REASON)
                .to_string();

            StatusPatch {
                to: rule.to,
                history_entry,
                cancellation: Some(CancellationDetails {
                    cancelled_by: request.actor_role,
                    reason,
                    cancelled_at: now,
                }),
                delivered_at: None,
            }
        }
    };

    Ok(patch)
}

// ============================================================================
// Unit Tests
// ============================================================================
