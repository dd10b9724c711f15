// ============================================================================
// Order Domain - Business Logic for the Order Lifecycle
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (Role, OrderStatus, OrderItem, Invoice, ...)
// - Aggregate (the persisted Order document and StatusPatch)
// - State machine (transition table, ownership and actor checks)
// - Events (OrderCreated, OrderStatusChanged, OrderCancelled, InvoiceReady)
// - Commands (NewOrder, ChangeStatus)
// - Errors (OrderError enum)
// - Numbering (OrderNumberGenerator)
// - Command Handler (OrderService)
//
// ============================================================================

pub mod value_objects;
pub mod aggregate;
pub mod state_machine;
pub mod events;
pub mod commands;
pub mod errors;
pub mod numbering;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use aggregate::*;
pub use state_machine::{plan_transition, rule_for, TransitionRequest, DEFAULT_CANCEL_REASON};
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use numbering::OrderNumberGenerator;
pub use command_handler::*;
