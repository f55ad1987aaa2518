//! Ledger transaction types.
//!
//! Every balance change creates an immutable transaction record. Amounts are
//! always positive; the direction is implied by the kind.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, TransactionId};

/// A ledger transaction representing one balance change.
///
/// Transactions use ULIDs for time-ordered IDs and are never modified or
/// deleted once written.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The account whose balance was affected.
    pub account_id: AccountId,

    /// Kind of transaction; determines the sign of the balance change.
    pub kind: TransactionKind,

    /// Amount in kopeks, always positive.
    pub amount_kopeks: i64,

    /// Human-readable description.
    pub description: String,

    /// External idempotency key (payment gateway payment ID, etc).
    /// At most one completed transaction per key.
    pub external_id: Option<String>,

    /// Whether the transaction completed. Incomplete records exist only for
    /// payment flows that were started and never finished.
    pub is_completed: bool,

    /// When the transaction was created.
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Create a completed deposit transaction.
    #[must_use]
    pub fn deposit(
        account_id: AccountId,
        amount_kopeks: i64,
        description: String,
        external_id: Option<String>,
    ) -> Self {
        Self::new(
            account_id,
            TransactionKind::Deposit,
            amount_kopeks,
            description,
            external_id,
        )
    }

    /// Create a completed withdrawal transaction.
    #[must_use]
    pub fn withdrawal(account_id: AccountId, amount_kopeks: i64, description: String) -> Self {
        Self::new(
            account_id,
            TransactionKind::Withdrawal,
            amount_kopeks,
            description,
            None,
        )
    }

    /// Create a completed subscription payment transaction.
    #[must_use]
    pub fn subscription_payment(
        account_id: AccountId,
        amount_kopeks: i64,
        description: String,
    ) -> Self {
        Self::new(
            account_id,
            TransactionKind::SubscriptionPayment,
            amount_kopeks,
            description,
            None,
        )
    }

    /// Create a completed refund transaction.
    #[must_use]
    pub fn refund(account_id: AccountId, amount_kopeks: i64, description: String) -> Self {
        Self::new(
            account_id,
            TransactionKind::Refund,
            amount_kopeks,
            description,
            None,
        )
    }

    /// Create a completed referral reward transaction.
    #[must_use]
    pub fn referral_reward(account_id: AccountId, amount_kopeks: i64, description: String) -> Self {
        Self::new(
            account_id,
            TransactionKind::ReferralReward,
            amount_kopeks,
            description,
            None,
        )
    }

    fn new(
        account_id: AccountId,
        kind: TransactionKind,
        amount_kopeks: i64,
        description: String,
        external_id: Option<String>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            account_id,
            kind,
            amount_kopeks,
            description,
            external_id,
            is_completed: true,
            created_at: Utc::now(),
        }
    }

    /// The signed balance contribution of this transaction.
    ///
    /// Summing this over an account's completed transactions yields the
    /// account balance.
    #[must_use]
    pub fn signed_amount(&self) -> i64 {
        if self.kind.is_credit() {
            self.amount_kopeks
        } else {
            -self.amount_kopeks
        }
    }
}

/// Kind of ledger transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// User topped up the balance.
    Deposit,

    /// Balance reduced outside a subscription purchase (admin adjustment, payout).
    Withdrawal,

    /// Balance spent on a subscription purchase or renewal.
    SubscriptionPayment,

    /// Refund issued.
    Refund,

    /// Referral program payout.
    ReferralReward,
}

impl TransactionKind {
    /// Check if this kind adds to the balance.
    #[must_use]
    pub const fn is_credit(&self) -> bool {
        matches!(self, Self::Deposit | Self::Refund | Self::ReferralReward)
    }

    /// Check if this kind removes from the balance.
    #[must_use]
    pub const fn is_debit(&self) -> bool {
        matches!(self, Self::Withdrawal | Self::SubscriptionPayment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_transaction() {
        let account_id = AccountId::generate();
        let tx = Transaction::deposit(
            account_id,
            50_000,
            "Balance topup".into(),
            Some("pay_123".into()),
        );

        assert_eq!(tx.amount_kopeks, 50_000);
        assert_eq!(tx.kind, TransactionKind::Deposit);
        assert_eq!(tx.signed_amount(), 50_000);
        assert!(tx.is_completed);
        assert_eq!(tx.external_id.as_deref(), Some("pay_123"));
    }

    #[test]
    fn subscription_payment_is_negative() {
        let tx = Transaction::subscription_payment(
            AccountId::generate(),
            99_000,
            "30 day subscription".into(),
        );

        assert_eq!(tx.amount_kopeks, 99_000);
        assert_eq!(tx.signed_amount(), -99_000);
    }

    #[test]
    fn kind_credit_debit_partition() {
        assert!(TransactionKind::Deposit.is_credit());
        assert!(TransactionKind::Refund.is_credit());
        assert!(TransactionKind::ReferralReward.is_credit());
        assert!(!TransactionKind::Withdrawal.is_credit());

        assert!(TransactionKind::Withdrawal.is_debit());
        assert!(TransactionKind::SubscriptionPayment.is_debit());
        assert!(!TransactionKind::Deposit.is_debit());
    }
}
