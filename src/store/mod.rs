// ============================================================================
// Store Layer - collaborator interfaces over external persistence
// ============================================================================
//
// The order document store, the identity store and the per-day counter are
// external systems. The core only depends on these traits; implementations:
// - memory   in-process stores (tests, demo, single-node deployments)
// - scylla_store ScyllaDB-backed order store using LWT for compare-and-set
// - redis_counter atomic INCR day counter
//
// ============================================================================

mod memory;
mod redis_counter;
mod scylla_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{Invoice, Order, OrderStatus, Role, StatusPatch};

pub use memory::{InMemoryDailyCounter, InMemoryIdentityStore, InMemoryOrderStore};
pub use redis_counter::RedisDailyCounter;
pub use scylla_store::ScyllaOrderStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Order number already taken: {0}")]
    DuplicateOrderNumber(String),

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Outcome of a compare-and-set on an order's status
#[derive(Debug, Clone)]
pub enum ConditionalUpdate {
    Applied(Order),
    /// The order exists but its status was no longer the expected one
    Conflict,
    NotFound,
}

/// Filter for counting and listing orders of one party
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub buyer_id: Option<String>,
    pub seller_id: Option<String>,
    pub statuses: Option<Vec<OrderStatus>>,
    pub is_read: Option<bool>,
}

impl OrderFilter {
    pub fn for_party(role: Role, identity_id: &str) -> Self {
        match role {
            Role::Buyer => Self {
                buyer_id: Some(identity_id.to_string()),
                ..Self::default()
            },
            Role::Seller => Self {
                seller_id: Some(identity_id.to_string()),
                ..Self::default()
            },
        }
    }

    pub fn with_statuses(mut self, statuses: impl IntoIterator<Item = OrderStatus>) -> Self {
        self.statuses = Some(statuses.into_iter().collect());
        self
    }

    pub fn unread(mut self) -> Self {
        self.is_read = Some(false);
        self
    }

    pub fn matches(&self, order: &Order) -> bool {
        if let Some(ref buyer_id) = self.buyer_id {
            if &order.buyer_id != buyer_id {
                return false;
            }
        }
        if let Some(ref seller_id) = self.seller_id {
            if &order.seller_id != seller_id {
                return false;
            }
        }
        if let Some(ref statuses) = self.statuses {
            if !statuses.contains(&order.status) {
                return false;
            }
        }
        if let Some(is_read) = self.is_read {
            if order.is_read != is_read {
                return false;
            }
        }
        true
    }
}

/// Persisted order document store
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Highest order number starting with `prefix` (by numeric suffix)
    async fn find_max_order_number_for_prefix(&self, prefix: &str) -> StoreResult<Option<String>>;

    async fn exists_order_number(&self, order_number: &str) -> StoreResult<bool>;

    /// Insert a new order; fails with `DuplicateOrderNumber` if the number is taken
    async fn insert_order(&self, order: &Order) -> StoreResult<()>;

    async fn find_order(&self, order_id: Uuid) -> StoreResult<Option<Order>>;

    /// Atomically apply `patch` only if the stored status still equals `expected_from`
    async fn conditional_update_status(
        &self,
        order_id: Uuid,
        expected_from: OrderStatus,
        patch: &StatusPatch,
    ) -> StoreResult<ConditionalUpdate>;

    async fn count_by_filter(&self, filter: &OrderFilter) -> StoreResult<u64>;

    /// Most recent orders first
    async fn find_by_filter(&self, filter: &OrderFilter, limit: usize) -> StoreResult<Vec<Order>>;

    /// Flip `is_read` on the given orders of the seller; returns how many changed
    async fn mark_read_for_seller(&self, seller_id: &str, order_ids: &[Uuid]) -> StoreResult<u64>;

    async fn set_invoice(&self, order_id: Uuid, invoice: &Invoice) -> StoreResult<()>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentitySummary {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// External identity store (buyers and sellers)
#[async_trait]
pub trait IdentityStore: Send + Sync {
    async fn exists(&self, role: Role, identity_id: &str) -> StoreResult<bool>;

    async fn get_summary(&self, role: Role, identity_id: &str) -> StoreResult<Option<IdentitySummary>>;
}

/// Atomic upsert-and-increment counter keyed by UTC day (`YYYYMMDD`)
#[async_trait]
pub trait DailyCounter: Send + Sync {
    async fn increment(&self, day: &str) -> StoreResult<u32>;
}

/// Numeric suffix of an order number; missing or unparseable suffixes count as 0
pub fn order_number_suffix(order_number: &str) -> u32 {
    order_number
        .rsplit('-')
        .next()
        .and_then(|suffix| suffix.parse::<u32>().ok())
        .unwrap_or(0)
}
