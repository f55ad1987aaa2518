//! Billing account types.
//!
//! An account tracks the kopek balance and the one-way marker flags used by
//! the referral program. The balance is only ever changed together with a
//! matching ledger transaction, so it always equals the signed sum of the
//! account's transaction log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::AccountId;

/// A billing account for a VPN user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// The account ID.
    pub id: AccountId,

    /// Current balance in kopeks. Never negative.
    pub balance_kopeks: i64,

    /// Set once, by the first qualifying topup. Gates referral payouts.
    pub has_made_first_topup: bool,

    /// Set once, when the account first purchases a paid subscription.
    pub has_had_paid_subscription: bool,

    /// The account that referred this one, if any. Immutable after creation.
    pub referred_by: Option<AccountId>,

    /// Administrative status.
    pub status: AccountStatus,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new account with zero balance.
    #[must_use]
    pub fn new(id: AccountId, referred_by: Option<AccountId>) -> Self {
        let now = Utc::now();
        Self {
            id,
            balance_kopeks: 0,
            has_made_first_topup: false,
            has_had_paid_subscription: false,
            referred_by,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the account can cover a debit of the given amount.
    #[must_use]
    pub fn has_sufficient_balance(&self, amount_kopeks: i64) -> bool {
        self.balance_kopeks >= amount_kopeks
    }
}

/// Administrative status of an account.
///
/// Deletion is soft: the record stays so the transaction log keeps its
/// referent, but the account no longer accepts operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    /// Account is in good standing.
    Active,

    /// Account is blocked by an administrator.
    Blocked,

    /// Account is soft-deleted.
    Deleted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_account_has_zero_balance() {
        let account = Account::new(AccountId::generate(), None);
        assert_eq!(account.balance_kopeks, 0);
        assert!(!account.has_made_first_topup);
        assert!(!account.has_had_paid_subscription);
        assert_eq!(account.status, AccountStatus::Active);
    }

    #[test]
    fn sufficient_balance_boundary() {
        let mut account = Account::new(AccountId::generate(), None);
        account.balance_kopeks = 1000;

        assert!(account.has_sufficient_balance(500));
        assert!(account.has_sufficient_balance(1000));
        assert!(!account.has_sufficient_balance(1001));
    }

    #[test]
    fn referred_by_is_recorded() {
        let inviter = AccountId::generate();
        let account = Account::new(AccountId::generate(), Some(inviter));
        assert_eq!(account.referred_by, Some(inviter));
    }
}
