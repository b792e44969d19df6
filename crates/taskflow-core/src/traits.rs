use crate::error::TaskflowError;
use async_trait::async_trait;

/// Outbound edge of the assistant.
///
/// Every delivery transport (WhatsApp, SMS, console, etc.) implements this
/// trait so the reminder scheduler can stay transport-agnostic.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    /// Human-readable transport name.
    fn name(&self) -> &str;

    /// Deliver `text` to `recipient` (a normalized user id).
    ///
    /// `Err` means the message was not delivered.
    async fn send(&self, recipient: &str, text: &str) -> Result<(), TaskflowError>;
}
