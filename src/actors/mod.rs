// ============================================================================
// Actors Module
// ============================================================================
//
// Kameo actors for infrastructure concerns:
// - core/           - health types shared by actors and the HTTP layer
// - infrastructure/ - NotificationDispatcher (event bus), HealthMonitorActor
//
// Note: order rules live in domain::order::OrderService, NOT in actors.
//
// ============================================================================

mod core;
mod infrastructure;

pub use core::{ComponentHealth, HealthStatus};
pub use infrastructure::{
    Dispatch, EventBus, GetSystemHealth, HealthMonitorActor, NotificationDispatcher,
    RefreshHealth, SystemHealth, UpdateHealth,
};
