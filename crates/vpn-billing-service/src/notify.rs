//! Notification sink.
//!
//! The core never talks to a messenger directly; it hands messages to a
//! [`NotificationSink`] and moves on. Delivery is fire-and-forget: a failed
//! notification never fails the operation that produced it.

use async_trait::async_trait;

use vpn_billing_core::AccountId;

/// Destination for user-facing and operator-facing messages.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Notify a single account.
    async fn notify_user(&self, account_id: AccountId, message: &str);

    /// Notify the operator channel.
    async fn notify_admin(&self, message: &str);
}

/// Default sink that writes notifications to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify_user(&self, account_id: AccountId, message: &str) {
        tracing::info!(account_id = %account_id, message = %message, "User notification");
    }

    async fn notify_admin(&self, message: &str) {
        tracing::info!(message = %message, "Admin notification");
    }
}
