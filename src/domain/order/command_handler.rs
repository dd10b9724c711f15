use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::metrics::Metrics;
use crate::services::InvoiceGenerator;
use crate::store::{ConditionalUpdate, IdentityStore, OrderFilter, OrderStore, StoreError};
use crate::utils::{retry_with_backoff, RetryConfig};

use super::aggregate::Order;
use super::commands::{ChangeStatus, NewOrder};
use super::errors::OrderError;
use super::events::{InvoiceReady, OrderCreated, OrderEvent};
use super::numbering::OrderNumberGenerator;
use super::state_machine::{plan_transition, TransitionRequest};
use super::value_objects::{Invoice, OrderStatus, Role};

// ============================================================================
// Order Service (command handler)
// ============================================================================
//
// Orchestrates: Command → State machine → Conditional write → Event
//
// Events are handed to the EventSink only after the store accepted the write,
// and exactly once per committed mutation. The sink never reports failure back.
//
// ============================================================================

const INSERT_ATTEMPTS: u32 = 5;

/// Where committed domain events go
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn emit(&self, event: OrderEvent);
}

/// A committed transition plus any non-fatal side-effect failures
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order: Order,
    pub warnings: Vec<String>,
}

pub struct OrderService {
    store: Arc<dyn OrderStore>,
    identities: Arc<dyn IdentityStore>,
    numbering: OrderNumberGenerator,
    invoices: Arc<dyn InvoiceGenerator>,
    events: Arc<dyn EventSink>,
    invoice_retry: RetryConfig,
    metrics: Option<Arc<Metrics>>,
}

impl OrderService {
    pub fn new(
        store: Arc<dyn OrderStore>,
        identities: Arc<dyn IdentityStore>,
        numbering: OrderNumberGenerator,
        invoices: Arc<dyn InvoiceGenerator>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            store,
            identities,
            numbering,
            invoices,
            events,
            invoice_retry: RetryConfig::once(),
            metrics: None,
        }
    }

    /// One generation attempt by default; failures are repaired with `regenerate_invoice`
    pub fn with_invoice_retry(mut self, retry: RetryConfig) -> Self {
        self.invoice_retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    /// Place a new order: validate, number, persist, then announce to the seller
    pub async fn create_order(&self, command: NewOrder) -> Result<Order, OrderError> {
        command.validate()?;
        self.require_identity(Role::Buyer, &command.buyer_id).await?;
        self.require_identity(Role::Seller, &command.seller_id).await?;

        let mut attempt = 1;
        let order = loop {
            let order_number = self.numbering.generate().await;
            let order = Order::new_pending(
                order_number,
                command.buyer_id.clone(),
                command.seller_id.clone(),
                command.items.clone(),
                command.notes.clone(),
            );

            match self.store.insert_order(&order).await {
                Ok(()) => break order,
                Err(StoreError::DuplicateOrderNumber(taken)) if attempt < INSERT_ATTEMPTS => {
                    tracing::warn!(
                        order_number = %taken,
                        attempt,
                        "Lost order number race, regenerating"
                    );
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        };

        if let Some(ref metrics) = self.metrics {
            metrics.record_order_created();
        }

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            buyer_id = %order.buyer_id,
            seller_id = %order.seller_id,
            total_price = order.total_price(),
            "✅ Order placed"
        );

        self.events
            .emit(OrderEvent::Created(OrderCreated::from(&order)))
            .await;

        Ok(order)
    }

    /// Move an order along the state machine with a compare-and-set on its status
    pub async fn transition(&self, command: ChangeStatus) -> Result<TransitionOutcome, OrderError> {
        let started = Instant::now();
        let result = self.try_transition(&command).await;

        match result {
            Ok(ref outcome) => {
                if let Some(ref metrics) = self.metrics {
                    let from = outcome
                        .order
                        .status_history
                        .iter()
                        .rev()
                        .nth(1)
                        .map(|entry| entry.status.as_str())
                        .unwrap_or("unknown");
                    metrics.record_transition(
                        from,
                        outcome.order.status.as_str(),
                        started.elapsed().as_secs_f64(),
                    );
                }
            }
            Err(ref e) => {
                tracing::warn!(
                    order_id = %command.order_id,
                    target = %command.target,
                    actor_role = %command.actor_role,
                    actor_id = %command.actor_id,
                    error = %e,
                    "Transition rejected"
                );
                if let Some(ref metrics) = self.metrics {
                    metrics.record_rejection(e.reason());
                }
            }
        }

        result
    }

    async fn try_transition(&self, command: &ChangeStatus) -> Result<TransitionOutcome, OrderError> {
        let current = self.load(command.order_id).await?;

        let request = TransitionRequest {
            target: command.target,
            actor_role: command.actor_role,
            actor_id: &command.actor_id,
            notes: command.notes.clone(),
        };
        let patch = plan_transition(&current, &request, Utc::now())?;

        let mut order = match self
            .store
            .conditional_update_status(current.id, current.status, &patch)
            .await?
        {
            ConditionalUpdate::Applied(order) => order,
            ConditionalUpdate::Conflict => {
                return Err(OrderError::Conflict {
                    order_id: current.id,
                    expected: current.status,
                })
            }
            ConditionalUpdate::NotFound => {
                return Err(OrderError::NotFound(format!("order {}", current.id)))
            }
        };

        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            from = %current.status,
            to = %order.status,
            actor_role = %command.actor_role,
            "✅ Order status changed"
        );

        self.events
            .emit(OrderEvent::for_transition(&order, current.status))
            .await;

        let mut warnings = Vec::new();
        if order.status == OrderStatus::Delivered {
            if let Err(warning) = self.issue_invoice(&mut order).await {
                warnings.push(warning);
            }
        }

        Ok(TransitionOutcome { order, warnings })
    }

    pub async fn update_status(
        &self,
        order_id: Uuid,
        target: OrderStatus,
        actor_role: Role,
        actor_id: &str,
        notes: Option<String>,
    ) -> Result<TransitionOutcome, OrderError> {
        self.transition(ChangeStatus {
            order_id,
            target,
            actor_role,
            actor_id: actor_id.to_string(),
            notes,
        })
        .await
    }

    pub async fn cancel_order(
        &self,
        order_id: Uuid,
        actor_role: Role,
        actor_id: &str,
        reason: Option<String>,
    ) -> Result<TransitionOutcome, OrderError> {
        self.transition(ChangeStatus::cancel(order_id, actor_role, actor_id, reason))
            .await
    }

    /// Seller listing view. Returned orders keep the `is_read` they had before
    /// the view; afterwards only the listed ones are marked read.
    pub async fn list_seller_orders(&self, seller_id: &str, limit: usize) -> Result<Vec<Order>, OrderError> {
        let filter = OrderFilter::for_party(Role::Seller, seller_id);
        let orders = self.store.find_by_filter(&filter, limit).await?;

        let unread: Vec<Uuid> = orders
            .iter()
            .filter(|order| !order.is_read)
            .map(|order| order.id)
            .collect();
        let marked = if unread.is_empty() {
            0
        } else {
            self.store.mark_read_for_seller(seller_id, &unread).await?
        };

        tracing::debug!(
            seller_id = %seller_id,
            listed = orders.len(),
            marked_read = marked,
            "Seller listed orders"
        );

        Ok(orders)
    }

    pub async fn list_buyer_orders(&self, buyer_id: &str, limit: usize) -> Result<Vec<Order>, OrderError> {
        let filter = OrderFilter::for_party(Role::Buyer, buyer_id);
        Ok(self.store.find_by_filter(&filter, limit).await?)
    }

    /// Fetch an order on behalf of one of its parties
    pub async fn get_order(&self, order_id: Uuid, role: Role, actor_id: &str) -> Result<Order, OrderError> {
        let order = self.load(order_id).await?;
        if !order.is_owned_by(role, actor_id) {
            return Err(OrderError::Unauthorized(format!(
                "{} {} does not own order {}",
                role, actor_id, order.order_number
            )));
        }
        Ok(order)
    }

    /// Retry the invoice of a delivered order whose first generation failed
    pub async fn regenerate_invoice(&self, order_id: Uuid, seller_id: &str) -> Result<TransitionOutcome, OrderError> {
        let mut order = self.get_order(order_id, Role::Seller, seller_id).await?;
        if order.status != OrderStatus::Delivered {
            return Err(OrderError::Validation(format!(
                "order {} is {}; only delivered orders have invoices",
                order.order_number, order.status
            )));
        }
        if order.invoice.as_ref().is_some_and(|invoice| invoice.generated) {
            return Err(OrderError::Validation(format!(
                "order {} already has an invoice",
                order.order_number
            )));
        }

        let mut warnings = Vec::new();
        if let Err(warning) = self.issue_invoice(&mut order).await {
            warnings.push(warning);
        }
        Ok(TransitionOutcome { order, warnings })
    }

    async fn load(&self, order_id: Uuid) -> Result<Order, OrderError> {
        self.store
            .find_order(order_id)
            .await?
            .ok_or_else(|| OrderError::NotFound(format!("order {}", order_id)))
    }

    async fn require_identity(&self, role: Role, identity_id: &str) -> Result<(), OrderError> {
        if self.identities.exists(role, identity_id).await? {
            Ok(())
        } else {
            Err(OrderError::IdentityNotFound {
                role,
                identity_id: identity_id.to_string(),
            })
        }
    }

    /// Best effort: a failure becomes a warning, the delivery stays committed
    async fn issue_invoice(&self, order: &mut Order) -> Result<(), String> {
        let snapshot = order.clone();
        let generated = retry_with_backoff(&self.invoice_retry, "invoice_generation", |_| {
            self.invoices.generate(&snapshot)
        })
        .await;

        let invoice_ref = match generated {
            Ok(invoice_ref) => invoice_ref,
            Err((e, attempts)) => {
                tracing::warn!(
                    order_id = %order.id,
                    order_number = %order.order_number,
                    attempts,
                    error = %e,
                    "⚠️ Invoice generation failed, delivery kept"
                );
                if let Some(ref metrics) = self.metrics {
                    metrics.record_invoice_failure();
                }
                return Err(format!(
                    "invoice generation failed after {} attempt(s): {}",
                    attempts, e
                ));
            }
        };

        let invoice = Invoice::generated(invoice_ref.url, Utc::now());
        if let Err(e) = self.store.set_invoice(order.id, &invoice).await {
            tracing::error!(order_id = %order.id, error = %e, "Failed to persist invoice");
            if let Some(ref metrics) = self.metrics {
                metrics.record_invoice_failure();
            }
            return Err(format!("invoice generated but not saved: {}", e));
        }

        order.invoice = Some(invoice.clone());
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            url = invoice.url.as_deref().unwrap_or_default(),
            "🧾 Invoice ready"
        );

        if let (Some(url), Some(generated_at)) = (invoice.url, invoice.generated_at) {
            self.events
                .emit(OrderEvent::InvoiceReady(InvoiceReady {
                    order_id: order.id,
                    order_number: order.order_number.clone(),
                    buyer_id: order.buyer_id.clone(),
                    seller_id: order.seller_id.clone(),
                    url,
                    generated_at,
                }))
                .await;
        }

        Ok(())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
