use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::snapshot::Snapshot;
use crate::domain::order::{Order, OrderStatus, Role};

// ============================================================================
// Client → Server Messages
// ============================================================================

/// Message sent from client to server.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Bind this connection to a buyer or seller identity.
    Join { role: Role, identity_id: String },
    /// Move an order to `new_status` (parsed case-insensitively).
    UpdateStatus {
        order_id: Uuid,
        new_status: String,
        #[serde(default)]
        notes: Option<String>,
    },
    CancelOrder {
        order_id: Uuid,
        #[serde(default)]
        reason: Option<String>,
    },
    ListOrders {
        #[serde(default)]
        limit: Option<usize>,
    },
    /// Ping message for keepalive.
    Ping,
}

// ============================================================================
// Server → Client Messages
// ============================================================================

/// Anything written to a connection: a push event or a reply to a request.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Push(PushMessage),
    Reply(ServerReply),
}

/// Domain event delivered to a live connection: `{type, data, timestamp}`.
#[derive(Debug, Clone, Serialize)]
pub struct PushMessage {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

/// Answer to one client request.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerReply {
    Joined {
        role: Role,
        identity_id: String,
        snapshot: Snapshot,
        timestamp: DateTime<Utc>,
    },
    StatusUpdated {
        order_id: Uuid,
        order_number: String,
        status: OrderStatus,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    OrderCancelled {
        order_id: Uuid,
        order_number: String,
        reason: String,
    },
    Orders { orders: Vec<Order> },
    Pong { timestamp: DateTime<Utc> },
    /// Error message with a stable code.
    Error { message: String, code: String },
}

impl ServerReply {
    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        ServerReply::Error {
            message: message.into(),
            code: code.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ServerReply::Error { .. })
    }
}

impl From<ServerReply> for ServerMessage {
    fn from(reply: ServerReply) -> Self {
        ServerMessage::Reply(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_client_messages() {
        let join: ClientMessage =
            serde_json::from_str(r#"{"type":"join","role":"seller","identityId":"s-1"}"#).unwrap();
        assert!(matches!(
            join,
            ClientMessage::Join { role: Role::Seller, ref identity_id } if identity_id == "s-1"
        ));

        let update: ClientMessage = serde_json::from_str(
            r#"{"type":"updateStatus","orderId":"0192f0c4-0000-7000-8000-000000000001","newStatus":"shipped"}"#,
        )
        .unwrap();
        assert!(matches!(update, ClientMessage::UpdateStatus { notes: None, .. }));

        let ping: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert!(matches!(ping, ClientMessage::Ping));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"join","role":"admin","identityId":"x"}"#).is_err());
    }

    #[test]
    fn test_push_and_error_shapes() {
        let push = ServerMessage::Push(PushMessage {
            event_type: "order.created".to_string(),
            data: serde_json::json!({"orderNumber": "ORD-20261019-001"}),
            timestamp: Utc::now(),
        });
        let json = serde_json::to_value(&push).unwrap();
        assert_eq!(json["type"], "order.created");
        assert_eq!(json["data"]["orderNumber"], "ORD-20261019-001");
        assert!(json.get("timestamp").is_some());

        let error = ServerMessage::from(ServerReply::error("nope", "INVALID_TRANSITION"));
        let json = serde_json::to_value(&error).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "INVALID_TRANSITION");
    }
}
