use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;

use super::protocol::{PushMessage, ServerMessage};
use super::registry::ConnectionRegistry;
use crate::domain::order::{OrderEvent, Role};
use crate::metrics::Metrics;
use crate::store::IdentityStore;

// ============================================================================
// Notification Router
// ============================================================================
//
// Resolves the target identity's live handles and sends to each one directly.
// There is no room/group indirection, so a handle is reachable as soon as
// `join` has registered it.
//
// Zero deliveries is a normal outcome (client offline): the order document
// stays the source of truth for the next fetch or join snapshot.
//
// ============================================================================

pub struct NotificationRouter {
    registry: Arc<ConnectionRegistry>,
    identities: Arc<dyn IdentityStore>,
    metrics: Option<Arc<Metrics>>,
}

impl NotificationRouter {
    pub fn new(registry: Arc<ConnectionRegistry>, identities: Arc<dyn IdentityStore>) -> Self {
        Self {
            registry,
            identities,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Fan a domain event out to its audience; returns how many handles got it
    pub async fn publish(&self, event: &OrderEvent) -> usize {
        let (role, identity_id) = event.audience();

        let data = match self.event_data(event).await {
            Ok(data) => data,
            Err(e) => {
                tracing::error!(
                    event_type = event.event_type(),
                    order_id = %event.order_id(),
                    error = %e,
                    "Failed to serialize event payload"
                );
                return 0;
            }
        };

        self.publish_to(role, identity_id, event.event_type(), data)
    }

    /// Send `{type, data, timestamp}` to every live handle of (role, identity)
    pub fn publish_to(&self, role: Role, identity_id: &str, event_type: &str, data: Value) -> usize {
        let handles = self.registry.resolve(role, identity_id);
        let message = ServerMessage::Push(PushMessage {
            event_type: event_type.to_string(),
            data,
            timestamp: Utc::now(),
        });

        let mut delivered = 0;
        for handle in &handles {
            match handle.send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!(
                    connection_id = %handle.id,
                    event_type = %event_type,
                    error = %e,
                    "Dropped push"
                ),
            }
        }

        if delivered == 0 {
            tracing::debug!(
                role = %role,
                identity_id = %identity_id,
                event_type = %event_type,
                "No live connection, push skipped"
            );
        } else {
            tracing::debug!(
                role = %role,
                identity_id = %identity_id,
                event_type = %event_type,
                delivered,
                "📨 Push delivered"
            );
        }

        if let Some(ref metrics) = self.metrics {
            metrics.record_delivery(event_type, delivered);
        }
        delivered
    }

    /// Event fields plus a summary of the other party, enough to render the
    /// notification without another round trip
    async fn event_data(&self, event: &OrderEvent) -> Result<Value, serde_json::Error> {
        let mut data = match event {
            OrderEvent::Created(e) => serde_json::to_value(e)?,
            OrderEvent::StatusChanged(e) => serde_json::to_value(e)?,
            OrderEvent::Cancelled(e) => serde_json::to_value(e)?,
            OrderEvent::InvoiceReady(e) => serde_json::to_value(e)?,
        };

        let (role, identity_id) = event.counterpart();
        let summary = match self.identities.get_summary(role, identity_id).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(role = %role, identity_id = %identity_id, error = %e, "Counterpart lookup failed");
                None
            }
        };

        if let Value::Object(ref mut fields) = data {
            fields.insert(
                "counterpart".to_string(),
                json!({
                    "role": role,
                    "id": identity_id,
                    "displayName": summary.map(|s| s.display_name),
                }),
            );
        }
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Order, OrderCreated, OrderItem};
    use crate::realtime::ConnectionHandle;
    use crate::store::{InMemoryIdentityStore, InMemoryOrderStore};

    fn router() -> NotificationRouter {
        let identities: Arc<dyn IdentityStore> = Arc::new(
            InMemoryIdentityStore::new()
                .with_identity(Role::Buyer, "buyer-1", "Ada")
                .with_identity(Role::Seller, "seller-1", "Shop"),
        );
        let registry = Arc::new(ConnectionRegistry::new(
            identities.clone(),
            Arc::new(InMemoryOrderStore::new()),
        ));
        NotificationRouter::new(registry, identities)
    }

    fn created() -> OrderEvent {
        let order = Order::new_pending(
            "ORD-20261019-004".to_string(),
            "buyer-1".to_string(),
            "seller-1".to_string(),
            vec![OrderItem::new("sku", 3, 2.0)],
            None,
        );
        OrderEvent::Created(OrderCreated::from(&order))
    }

    #[tokio::test]
    async fn test_publish_without_connections_delivers_nothing() {
        let router = router();
        assert_eq!(router.publish(&created()).await, 0);
    }

    #[tokio::test]
    async fn test_publish_reaches_every_handle_of_the_audience() {
        let router = router();
        let (seller_a, mut rx_a) = ConnectionHandle::channel(8);
        let (seller_b, mut rx_b) = ConnectionHandle::channel(8);
        let (buyer, mut rx_buyer) = ConnectionHandle::channel(8);
        router.registry().join(Role::Seller, "seller-1", seller_a).await.unwrap();
        router.registry().join(Role::Seller, "seller-1", seller_b).await.unwrap();
        router.registry().join(Role::Buyer, "buyer-1", buyer).await.unwrap();

        assert_eq!(router.publish(&created()).await, 2);

        for rx in [&mut rx_a, &mut rx_b] {
            let json = serde_json::to_value(rx.recv().await.unwrap()).unwrap();
            assert_eq!(json["type"], "order.created");
            assert_eq!(json["data"]["orderNumber"], "ORD-20261019-004");
            assert_eq!(json["data"]["totalPrice"], 6.0);
            assert_eq!(json["data"]["counterpart"]["displayName"], "Ada");
        }
        assert!(rx_buyer.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_full_buffer_drops_instead_of_blocking() {
        let router = router();
        let (seller, _rx) = ConnectionHandle::channel(1);
        router.registry().join(Role::Seller, "seller-1", seller).await.unwrap();

        assert_eq!(router.publish(&created()).await, 1);
        assert_eq!(router.publish(&created()).await, 0);
    }
}
