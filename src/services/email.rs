use async_trait::async_trait;
use serde_json::Value;

use super::ServiceError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailTemplate {
    OrderStatusChanged,
    OrderCancelled,
}

impl EmailTemplate {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmailTemplate::OrderStatusChanged => "order-status-changed",
            EmailTemplate::OrderCancelled => "order-cancelled",
        }
    }
}

/// Best-effort mail transport
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, to: &str, template: EmailTemplate, data: &Value) -> Result<(), ServiceError>;
}

/// Writes outgoing mail to the log instead of an SMTP relay
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send(&self, to: &str, template: EmailTemplate, data: &Value) -> Result<(), ServiceError> {
        tracing::info!(
            to = %to,
            template = template.as_str(),
            data = %data,
            "📧 Email queued"
        );
        Ok(())
    }
}
