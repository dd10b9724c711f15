// ============================================================================
// Order Lifecycle & Real-Time Notification Engine
// ============================================================================
//
// - domain    order rules: numbering, state machine, events, OrderService
// - store     collaborator traits + in-memory / ScyllaDB / Redis backends
// - services  invoice generator and email sender collaborators
// - realtime  connection registry, notification router, client sessions
// - actors    kameo event bus and health monitor
// - metrics   prometheus registry + actix-web /metrics and /health
//
// ============================================================================

pub mod actors;
pub mod config;
pub mod domain;
pub mod metrics;
pub mod realtime;
pub mod services;
pub mod store;
pub mod utils;
