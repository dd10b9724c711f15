// ============================================================================
// Realtime Layer - live buyer/seller connections
// ============================================================================
//
// - protocol  JSON messages exchanged with clients
// - registry  (role, identity) -> live connection handles
// - snapshot  catch-up state returned on join
// - router    domain event -> direct sends to resolved handles
// - session   one connection's request/reply loop
//
// Transport agnostic: a handle is an outbound queue, whatever drains it
// (WebSocket task, test, demo) owns the socket.
//
// ============================================================================

mod protocol;
mod registry;
mod router;
mod session;
mod snapshot;

pub use protocol::{ClientMessage, PushMessage, ServerMessage, ServerReply};
pub use registry::{ConnectionHandle, ConnectionId, ConnectionRegistry, RegistryStats};
pub use router::NotificationRouter;
pub use session::{ClientSession, DEFAULT_LIST_LIMIT};
pub use snapshot::{build_snapshot, OrderSummary, Snapshot, RECENT_ORDERS_LIMIT};

use crate::domain::order::OrderError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RealtimeError {
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Connection buffer full")]
    BufferFull,

    #[error("Invalid message: {0}")]
    InvalidMessage(#[from] serde_json::Error),

    #[error("Join first: no identity is bound to this connection")]
    NotJoined,

    #[error(transparent)]
    Order(#[from] OrderError),
}

impl From<StoreError> for RealtimeError {
    fn from(err: StoreError) -> Self {
        RealtimeError::Order(OrderError::Store(err))
    }
}

impl RealtimeError {
    pub fn code(&self) -> &'static str {
        match self {
            RealtimeError::ConnectionClosed => "CONNECTION_CLOSED",
            RealtimeError::BufferFull => "BUFFER_FULL",
            RealtimeError::InvalidMessage(_) => "INVALID_MESSAGE",
            RealtimeError::NotJoined => "NOT_JOINED",
            RealtimeError::Order(e) => e.code(),
        }
    }
}
