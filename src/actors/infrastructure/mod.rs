// ============================================================================
// Infrastructure Actors
// ============================================================================
//
// - Event bus: committed order events → realtime fan-out + email
// - Health monitoring
//
// ============================================================================

mod event_bus;
mod health_monitor;

pub use event_bus::{Dispatch, EventBus, NotificationDispatcher};
pub use health_monitor::{
    GetSystemHealth, HealthMonitorActor, RefreshHealth, SystemHealth, UpdateHealth,
};
