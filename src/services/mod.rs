// ============================================================================
// Outbound collaborators
// ============================================================================
//
// Invoice rendering and email transport live outside this service. The core
// talks to them through these narrow traits; failures are never fatal to the
// order mutation that triggered them.
//
// ============================================================================

mod email;
mod invoice;

pub use email::{EmailSender, EmailTemplate, LogEmailSender};
pub use invoice::{InvoiceGenerator, InvoiceRef, LocalInvoiceGenerator};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Invoice generation failed: {0}")]
    Invoice(String),

    #[error("Email delivery failed: {0}")]
    Email(String),
}
