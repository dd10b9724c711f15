use async_trait::async_trait;
use kameo::actor::ActorRef;
use kameo::error::Infallible;
use kameo::message::{Context, Message};
use kameo::Actor;
use serde_json::json;
use std::sync::Arc;

use crate::domain::order::{EventSink, OrderEvent};
use crate::realtime::NotificationRouter;
use crate::services::{EmailSender, EmailTemplate};
use crate::store::IdentityStore;

// ============================================================================
// Notification Dispatcher - the event bus behind OrderService
// ============================================================================
//
// OrderService hands each committed event to `EventBus::emit`, which only
// enqueues a `Dispatch` (tell, without waiting on a full mailbox). The mailbox
// keeps events in commit order per emitter, and nothing on the delivery path
// can fail or slow the mutation.
//
// Per event:
// - realtime fan-out through the NotificationRouter
// - best-effort email to the notified party, spawned off the mailbox
//
// ============================================================================

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone)]
pub struct Dispatch(pub OrderEvent);

// ============================================================================
// Notification Dispatcher Actor
// ============================================================================

pub struct NotificationDispatcher {
    router: Arc<NotificationRouter>,
    identities: Arc<dyn IdentityStore>,
    email: Option<Arc<dyn EmailSender>>,
}

impl NotificationDispatcher {
    pub fn new(router: Arc<NotificationRouter>, identities: Arc<dyn IdentityStore>) -> Self {
        Self {
            router,
            identities,
            email: None,
        }
    }

    pub fn with_email(mut self, email: Arc<dyn EmailSender>) -> Self {
        self.email = Some(email);
        self
    }

    fn send_email(&self, event: &OrderEvent) {
        let Some(ref email) = self.email else {
            return;
        };

        let (template, data) = match event {
            OrderEvent::StatusChanged(e) => (
                EmailTemplate::OrderStatusChanged,
                json!({
                    "orderNumber": e.order_number,
                    "previousStatus": e.previous_status,
                    "status": e.status,
                    "notes": e.notes,
                }),
            ),
            OrderEvent::Cancelled(e) => (
                EmailTemplate::OrderCancelled,
                json!({
                    "orderNumber": e.order_number,
                    "cancelledBy": e.cancelled_by,
                    "reason": e.reason,
                }),
            ),
            OrderEvent::Created(_) | OrderEvent::InvoiceReady(_) => return,
        };

        let (role, identity_id) = event.audience();
        let identity_id = identity_id.to_string();
        let identities = self.identities.clone();
        let email = email.clone();

        tokio::spawn(async move {
            let address = match identities.get_summary(role, &identity_id).await {
                Ok(Some(summary)) => summary.email,
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(role = %role, identity_id = %identity_id, error = %e, "Email recipient lookup failed");
                    None
                }
            };

            let Some(address) = address else {
                tracing::debug!(role = %role, identity_id = %identity_id, "No email address, skipping");
                return;
            };

            if let Err(e) = email.send(&address, template, &data).await {
                tracing::warn!(
                    to = %address,
                    template = template.as_str(),
                    error = %e,
                    "Email notification failed"
                );
            }
        });
    }
}

impl Actor for NotificationDispatcher {
    type Args = Self;
    type Error = Infallible;

    async fn on_start(state: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        tracing::info!("NotificationDispatcher started");
        Ok(state)
    }
}

// ============================================================================
// Message Handlers
// ============================================================================

impl Message<Dispatch> for NotificationDispatcher {
    type Reply = usize;

    async fn handle(&mut self, msg: Dispatch, _ctx: &mut Context<Self, Self::Reply>) -> Self::Reply {
        let Dispatch(event) = msg;

        tracing::debug!(
            event_type = event.event_type(),
            order_number = %event.order_number(),
            "Dispatching order event"
        );

        let delivered = self.router.publish(&event).await;
        self.send_email(&event);
        delivered
    }
}

// ============================================================================
// EventBus - EventSink backed by the dispatcher's mailbox
// ============================================================================

#[derive(Clone)]
pub struct EventBus {
    dispatcher: ActorRef<NotificationDispatcher>,
}

impl EventBus {
    /// Spawn the dispatcher actor; requires a running tokio runtime
    pub fn spawn(dispatcher: NotificationDispatcher) -> Self {
        Self {
            dispatcher: NotificationDispatcher::spawn(dispatcher),
        }
    }

    pub fn actor_ref(&self) -> &ActorRef<NotificationDispatcher> {
        &self.dispatcher
    }
}

#[async_trait]
impl EventSink for EventBus {
    async fn emit(&self, event: OrderEvent) {
        let event_type = event.event_type();
        let order_id = event.order_id();

        // Never wait for mailbox capacity: a backed-up dispatcher drops the push,
        // the order document stays the source of truth
        if let Err(e) = self.dispatcher.tell(Dispatch(event)).try_send() {
            tracing::warn!(
                event_type = event_type,
                order_id = %order_id,
                error = ?e,
                "Event dropped: dispatcher full or unavailable"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::order::{Order, OrderItem, OrderStatus, OrderStatusChanged, Role};
    use crate::realtime::{ConnectionHandle, ConnectionRegistry, ServerMessage};
    use crate::services::ServiceError;
    use crate::store::{IdentitySummary, InMemoryIdentityStore, InMemoryOrderStore, StoreResult};
    use chrono::Utc;
    use serde_json::Value;
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct ChannelEmail(mpsc::UnboundedSender<(String, EmailTemplate)>);

    #[async_trait]
    impl EmailSender for ChannelEmail {
        async fn send(&self, to: &str, template: EmailTemplate, _data: &Value) -> Result<(), ServiceError> {
            let _ = self.0.send((to.to_string(), template));
            Ok(())
        }
    }

    fn status_changed() -> OrderEvent {
        let order = Order::new_pending(
            "ORD-20261019-010".to_string(),
            "buyer-1".to_string(),
            "seller-1".to_string(),
            vec![OrderItem::new("sku", 1, 1.0)],
            None,
        );
        OrderEvent::StatusChanged(OrderStatusChanged {
            order_id: order.id,
            order_number: order.order_number.clone(),
            buyer_id: order.buyer_id.clone(),
            seller_id: order.seller_id.clone(),
            previous_status: OrderStatus::Pending,
            status: OrderStatus::Processing,
            total_price: order.total_price(),
            notes: None,
            changed_at: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_dispatch_pushes_and_emails_the_buyer() {
        let identities = Arc::new(InMemoryIdentityStore::new().with_identity(Role::Seller, "seller-1", "Shop"));
        identities.insert(
            Role::Buyer,
            "buyer-1",
            IdentitySummary {
                display_name: "Ada".to_string(),
                email: Some("ada@example.com".to_string()),
            },
        );
        let identities: Arc<dyn IdentityStore> = identities;

        let registry = Arc::new(ConnectionRegistry::new(
            identities.clone(),
            Arc::new(InMemoryOrderStore::new()),
        ));
        let router = Arc::new(NotificationRouter::new(registry.clone(), identities.clone()));

        let (mail_tx, mut mail_rx) = mpsc::unbounded_channel();
        let bus = EventBus::spawn(
            NotificationDispatcher::new(router, identities).with_email(Arc::new(ChannelEmail(mail_tx))),
        );

        let (handle, mut rx) = ConnectionHandle::channel(8);
        registry.join(Role::Buyer, "buyer-1", handle).await.unwrap();

        let delivered = bus.actor_ref().ask(Dispatch(status_changed())).await.unwrap();
        assert_eq!(delivered, 1);

        match rx.recv().await.unwrap() {
            ServerMessage::Push(push) => assert_eq!(push.event_type, "order.status.changed"),
            other => panic!("unexpected message {:?}", other),
        }

        let (to, template) = tokio::time::timeout(Duration::from_secs(1), mail_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(to, "ada@example.com");
        assert_eq!(template, EmailTemplate::OrderStatusChanged);
    }

    struct FailingEmail;

    #[async_trait]
    impl EmailSender for FailingEmail {
        async fn send(&self, _to: &str, _template: EmailTemplate, _data: &Value) -> Result<(), ServiceError> {
            Err(ServiceError::Email("smtp relay refused".to_string()))
        }
    }

    #[tokio::test]
    async fn test_email_failure_does_not_affect_fan_out() {
        let identities = Arc::new(InMemoryIdentityStore::new());
        identities.insert(
            Role::Buyer,
            "buyer-1",
            IdentitySummary {
                display_name: "Ada".to_string(),
                email: Some("ada@example.com".to_string()),
            },
        );
        let identities: Arc<dyn IdentityStore> = identities;
        let registry = Arc::new(ConnectionRegistry::new(
            identities.clone(),
            Arc::new(InMemoryOrderStore::new()),
        ));
        let router = Arc::new(NotificationRouter::new(registry.clone(), identities.clone()));
        let bus = EventBus::spawn(
            NotificationDispatcher::new(router, identities).with_email(Arc::new(FailingEmail)),
        );

        let (handle, _rx) = ConnectionHandle::channel(8);
        registry.join(Role::Buyer, "buyer-1", handle).await.unwrap();

        assert_eq!(bus.actor_ref().ask(Dispatch(status_changed())).await.unwrap(), 1);
        assert_eq!(bus.actor_ref().ask(Dispatch(status_changed())).await.unwrap(), 1);
    }

    /// Identity lookups that stall, so the dispatcher never drains its mailbox
    struct StalledIdentities;

    #[async_trait]
    impl IdentityStore for StalledIdentities {
        async fn exists(&self, _role: Role, _identity_id: &str) -> StoreResult<bool> {
            Ok(true)
        }

        async fn get_summary(&self, _role: Role, _identity_id: &str) -> StoreResult<Option<IdentitySummary>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_emit_does_not_wait_on_a_stalled_dispatcher() {
        let identities: Arc<dyn IdentityStore> = Arc::new(StalledIdentities);
        let registry = Arc::new(ConnectionRegistry::new(
            identities.clone(),
            Arc::new(InMemoryOrderStore::new()),
        ));
        let router = Arc::new(NotificationRouter::new(registry, identities.clone()));
        let bus = EventBus::spawn(NotificationDispatcher::new(router, identities));

        let burst = async {
            for _ in 0..500 {
                bus.emit(status_changed()).await;
            }
        };

        assert!(tokio::time::timeout(Duration::from_secs(2), burst).await.is_ok());
    }
}
