use async_trait::async_trait;

use super::ServiceError;
use crate::domain::order::{Order, OrderStatus};

#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRef {
    pub url: String,
}

/// Renders an invoice for a delivered order and returns where it lives
#[async_trait]
pub trait InvoiceGenerator: Send + Sync {
    async fn generate(&self, order: &Order) -> Result<InvoiceRef, ServiceError>;
}

/// Addresses invoices by order number under a fixed base URL
pub struct LocalInvoiceGenerator {
    base_url: String,
}

impl LocalInvoiceGenerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl InvoiceGenerator for LocalInvoiceGenerator {
    async fn generate(&self, order: &Order) -> Result<InvoiceRef, ServiceError> {
        if order.status != OrderStatus::Delivered {
            return Err(ServiceError::Invoice(format!(
                "order {} is {}, not Delivered",
                order.order_number, order.status
            )));
        }

        let url = format!(
            "{}/{}.pdf",
            self.base_url.trim_end_matches('/'),
            order.order_number
        );

        tracing::debug!(
            order_number = %order.order_number,
            total_price = order.total_price(),
            url = %url,
            "Invoice rendered"
        );

        Ok(InvoiceRef { url })
    }
}
