//! Referral program types.
//!
//! Earnings are bookkeeping rows next to the `referral_reward` transactions
//! that actually move money; they answer "who earned what from whom and why".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, EarningId, TransactionId};

/// A single referral payout record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralEarning {
    /// The earning ID (ULID, time-ordered).
    pub id: EarningId,

    /// The account that received the payout.
    pub beneficiary_id: AccountId,

    /// The referred account whose activity triggered the payout.
    pub referred_id: AccountId,

    /// Payout amount in kopeks.
    pub amount_kopeks: i64,

    /// Why the payout happened.
    pub reason: EarningReason,

    /// The topup transaction that triggered the payout, if any.
    pub source_transaction_id: Option<TransactionId>,

    /// When the payout happened.
    pub created_at: DateTime<Utc>,
}

impl ReferralEarning {
    /// Create a new earning record.
    #[must_use]
    pub fn new(
        beneficiary_id: AccountId,
        referred_id: AccountId,
        amount_kopeks: i64,
        reason: EarningReason,
        source_transaction_id: Option<TransactionId>,
    ) -> Self {
        Self {
            id: EarningId::generate(),
            beneficiary_id,
            referred_id,
            amount_kopeks,
            reason,
            source_transaction_id,
            created_at: Utc::now(),
        }
    }
}

/// Why a referral payout was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EarningReason {
    /// One-time bonus when the referred account makes its first qualifying topup.
    FirstTopupBonus,

    /// Percentage commission on a referred account's topup.
    TopupCommission,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earning_record_fields() {
        let inviter = AccountId::generate();
        let referred = AccountId::generate();
        let tx = TransactionId::generate();

        let earning = ReferralEarning::new(
            inviter,
            referred,
            2500,
            EarningReason::TopupCommission,
            Some(tx),
        );

        assert_eq!(earning.beneficiary_id, inviter);
        assert_eq!(earning.referred_id, referred);
        assert_eq!(earning.amount_kopeks, 2500);
        assert_eq!(earning.source_transaction_id, Some(tx));
    }
}
