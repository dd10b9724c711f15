use chrono::Utc;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::protocol::{ClientMessage, ServerMessage, ServerReply};
use super::registry::{ConnectionHandle, ConnectionId, ConnectionRegistry};
use super::RealtimeError;
use crate::domain::order::{OrderService, OrderStatus, Role, DEFAULT_CANCEL_REASON};

pub const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 100;

/// One client connection: parses requests, drives the order service and
/// answers with a reply. Pushes for the joined identity arrive on the same
/// outbound queue through the registry.
pub struct ClientSession {
    handle: Arc<ConnectionHandle>,
    registry: Arc<ConnectionRegistry>,
    orders: Arc<OrderService>,
    identity: Option<(Role, String)>,
}

impl ClientSession {
    pub fn open(
        registry: Arc<ConnectionRegistry>,
        orders: Arc<OrderService>,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (handle, rx) = ConnectionHandle::channel(buffer);
        tracing::debug!(connection_id = %handle.id, "Session opened");
        let session = Self {
            handle,
            registry,
            orders,
            identity: None,
        };
        (session, rx)
    }

    pub fn connection_id(&self) -> ConnectionId {
        self.handle.id
    }

    pub fn identity(&self) -> Option<(Role, &str)> {
        self.identity.as_ref().map(|(role, id)| (*role, id.as_str()))
    }

    /// Handle one raw frame and queue the reply on the connection
    pub async fn receive(&mut self, text: &str) -> Result<(), RealtimeError> {
        let reply = match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.handle_message(message).await,
            Err(e) => {
                let err = RealtimeError::from(e);
                ServerReply::error(err.to_string(), err.code())
            }
        };
        self.handle.send(reply.into())
    }

    /// Handle one parsed request; failures become `error { message, code }`
    pub async fn handle_message(&mut self, message: ClientMessage) -> ServerReply {
        match self.dispatch(message).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!(connection_id = %self.handle.id, code = e.code(), error = %e, "Request failed");
                ServerReply::error(e.to_string(), e.code())
            }
        }
    }

    async fn dispatch(&mut self, message: ClientMessage) -> Result<ServerReply, RealtimeError> {
        match message {
            ClientMessage::Join { role, identity_id } => {
                // One identity per connection: a re-join drops the previous one,
                // and a refused re-join leaves the session unjoined
                if let Some((previous_role, previous_id)) = self.identity.take() {
                    self.registry.leave(self.handle.id);
                    tracing::debug!(
                        connection_id = %self.handle.id,
                        role = %previous_role,
                        identity_id = %previous_id,
                        "Re-join: previous identity released"
                    );
                }

                let snapshot = self
                    .registry
                    .join(role, &identity_id, self.handle.clone())
                    .await?;
                self.identity = Some((role, identity_id.clone()));
                Ok(ServerReply::Joined {
                    role,
                    identity_id,
                    snapshot,
                    timestamp: Utc::now(),
                })
            }
            ClientMessage::UpdateStatus {
                order_id,
                new_status,
                notes,
            } => {
                let (role, actor_id) = self.require_identity()?;
                let target = OrderStatus::from_str(&new_status)?;
                let outcome = self
                    .orders
                    .update_status(order_id, target, role, &actor_id, notes)
                    .await?;
                Ok(ServerReply::StatusUpdated {
                    order_id: outcome.order.id,
                    order_number: outcome.order.order_number,
                    status: outcome.order.status,
                    warnings: outcome.warnings,
                })
            }
            ClientMessage::CancelOrder { order_id, reason } => {
                let (role, actor_id) = self.require_identity()?;
                let outcome = self
                    .orders
                    .cancel_order(order_id, role, &actor_id, reason)
                    .await?;
                let reason = outcome
                    .order
                    .cancellation_details
                    .as_ref()
                    .map(|details| details.reason.clone())
                    .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());
                Ok(ServerReply::OrderCancelled {
                    order_id: outcome.order.id,
                    order_number: outcome.order.order_number,
                    reason,
                })
            }
            ClientMessage::ListOrders { limit } => {
                let (role, identity_id) = self.require_identity()?;
                let limit = limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
                let orders = match role {
                    Role::Seller => self.orders.list_seller_orders(&identity_id, limit).await?,
                    Role::Buyer => self.orders.list_buyer_orders(&identity_id, limit).await?,
                };
                Ok(ServerReply::Orders { orders })
            }
            ClientMessage::Ping => Ok(ServerReply::Pong {
                timestamp: Utc::now(),
            }),
        }
    }

    fn require_identity(&self) -> Result<(Role, String), RealtimeError> {
        self.identity
            .clone()
            .ok_or(RealtimeError::NotJoined)
    }

    /// Disconnect: unregister from every identity this connection joined
    pub fn close(&mut self) {
        self.registry.leave(self.handle.id);
        self.identity = None;
    }
}

impl Drop for ClientSession {
    fn drop(&mut self) {
        self.registry.leave(self.handle.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{EventSink, OrderEvent, OrderNumberGenerator};
    use crate::services::LocalInvoiceGenerator;
    use crate::store::{IdentityStore, InMemoryIdentityStore, InMemoryOrderStore, OrderStore};
    use async_trait::async_trait;
    use serde_json::json;

    struct Discard;

    #[async_trait]
    impl EventSink for Discard {
        async fn emit(&self, _event: OrderEvent) {}
    }

    fn open_session() -> (ClientSession, mpsc::Receiver<ServerMessage>, Arc<ConnectionRegistry>) {
        let identities: Arc<dyn IdentityStore> = Arc::new(
            InMemoryIdentityStore::new()
                .with_identity(Role::Seller, "seller-1", "Shop")
                .with_identity(Role::Seller, "seller-2", "Stall"),
        );
        let store: Arc<dyn OrderStore> = Arc::new(InMemoryOrderStore::new());
        let registry = Arc::new(ConnectionRegistry::new(identities.clone(), store.clone()));
        let orders = Arc::new(OrderService::new(
            store.clone(),
            identities,
            OrderNumberGenerator::new(store),
            Arc::new(LocalInvoiceGenerator::new("http://invoices")),
            Arc::new(Discard),
        ));
        let (session, rx) = ClientSession::open(registry.clone(), orders, 8);
        (session, rx, registry)
    }

    fn join(role: Role, identity_id: &str) -> ClientMessage {
        ClientMessage::Join {
            role,
            identity_id: identity_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_rejoin_releases_previous_identity() {
        let (mut session, _rx, registry) = open_session();

        assert!(!session.handle_message(join(Role::Seller, "seller-1")).await.is_error());
        assert!(!session.handle_message(join(Role::Seller, "seller-2")).await.is_error());

        assert_eq!(session.identity(), Some((Role::Seller, "seller-2")));
        assert!(registry.resolve(Role::Seller, "seller-1").is_empty());
        assert_eq!(registry.resolve(Role::Seller, "seller-2").len(), 1);
        assert_eq!(registry.stats().total_connections, 1);
    }

    #[tokio::test]
    async fn test_refused_rejoin_leaves_session_unjoined() {
        let (mut session, _rx, registry) = open_session();

        assert!(!session.handle_message(join(Role::Seller, "seller-1")).await.is_error());
        let refused = session.handle_message(join(Role::Seller, "ghost")).await;

        assert!(refused.is_error());
        assert!(session.identity().is_none());
        assert!(registry.resolve(Role::Seller, "seller-1").is_empty());
        assert!(session
            .handle_message(ClientMessage::ListOrders { limit: None })
            .await
            .is_error());
    }

    #[tokio::test]
    async fn test_ping_needs_no_join() {
        let (mut session, mut rx, _registry) = open_session();

        session.receive(&json!({"type": "ping"}).to_string()).await.unwrap();
        match rx.recv().await.unwrap() {
            ServerMessage::Reply(reply) => {
                assert!(!reply.is_error());
                assert!(matches!(reply, ServerReply::Pong { .. }));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }
}
