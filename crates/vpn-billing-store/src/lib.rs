//! `RocksDB` storage layer for vpn-billing.
//!
//! This crate provides persistent storage for accounts, subscriptions, ledger
//! transactions, promo codes, and referral earnings using `RocksDB` with
//! column families.
//!
//! # Concurrency
//!
//! All compound operations (deposit, withdraw, promo code redemption, autopay
//! renewal, expiry resolution) are atomic: they run under a per-account lock
//! from [`locks::LockTable`] and commit through a single `WriteBatch`. The
//! promo code lock is always taken before the account lock.
//!
//! # Example
//!
//! ```no_run
//! use vpn_billing_store::{RocksStore, Store};
//! use vpn_billing_core::{Account, AccountId};
//!
//! let store = RocksStore::open("/tmp/vpn-billing-db").unwrap();
//!
//! let account = Account::new(AccountId::generate(), None);
//! store.create_account(&account).unwrap();
//!
//! let retrieved = store.get_account(&account.id).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod locks;
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use rocks::RocksStore;

use chrono::{DateTime, Utc};
use vpn_billing_core::{
    Account, AccountId, PromoCode, ReferralEarning, ServerGroupId, Subscription, Transaction,
    TransactionId, TransactionKind,
};

/// A balance credit request.
#[derive(Debug, Clone)]
pub struct DepositRequest {
    /// The account to credit.
    pub account_id: AccountId,

    /// Amount in kopeks, must be positive.
    pub amount_kopeks: i64,

    /// Transaction kind; must be a credit kind.
    pub kind: TransactionKind,

    /// Human-readable description for the ledger.
    pub description: String,

    /// External idempotency key. A second deposit with the same key is a
    /// no-op returning the original transaction.
    pub external_id: Option<String>,

    /// When set, a plain topup of at least this many kopeks flips the
    /// account's `has_made_first_topup` flag atomically with the credit.
    pub first_topup_threshold_kopeks: Option<i64>,
}

/// Result of a deposit.
#[derive(Debug, Clone)]
pub struct DepositOutcome {
    /// The ledger transaction (the original one when `duplicate` is set).
    pub transaction: Transaction,

    /// Balance after the deposit.
    pub new_balance_kopeks: i64,

    /// The external ID was already processed; nothing was written.
    pub duplicate: bool,

    /// This deposit flipped the account's first-topup flag. At most one
    /// deposit per account ever observes this.
    pub first_topup: bool,
}

/// Result of a withdrawal.
#[derive(Debug, Clone)]
pub struct WithdrawOutcome {
    /// The ledger transaction.
    pub transaction: Transaction,

    /// Balance after the debit.
    pub new_balance_kopeks: i64,
}

/// Result of the expiry correction for one subscription.
#[derive(Debug, Clone)]
pub struct ExpiryOutcome {
    /// The subscription after correction.
    pub subscription: Subscription,

    /// Whether this call performed the trial/active to expired transition.
    pub transitioned: bool,
}

/// Subscription defaults used when a promo code redemption has to create a
/// subscription: a trial code, or a days code for an account without one.
#[derive(Debug, Clone)]
pub struct TrialParams {
    /// Trial duration in days.
    pub duration_days: u32,
    /// Trial traffic allowance in GB (0 = unlimited).
    pub traffic_limit_gb: u32,
    /// Trial device allowance.
    pub device_limit: u32,
    /// Server group granted to trial users, if configured.
    pub group: Option<ServerGroupId>,
    /// Default autopay lead time carried onto the new subscription.
    pub autopay_days_before: u32,
}

/// The committed effect of a promo code redemption.
#[derive(Debug, Clone)]
pub enum RedeemedEffect {
    /// The balance was credited.
    BalanceCredited {
        /// The ledger transaction.
        transaction: Transaction,
        /// Balance after the credit.
        new_balance_kopeks: i64,
    },

    /// The existing subscription was extended.
    SubscriptionExtended {
        /// The subscription after extension.
        subscription: Subscription,
    },

    /// A trial subscription was granted.
    TrialGranted {
        /// The new subscription.
        subscription: Subscription,
    },
}

/// Result of an autopay renewal attempt.
#[derive(Debug, Clone)]
pub enum RenewalOutcome {
    /// The renewal was charged and the subscription extended.
    Renewed {
        /// The subscription after extension.
        subscription: Subscription,
        /// The `subscription_payment` ledger transaction.
        transaction: Transaction,
        /// Balance after the charge.
        new_balance_kopeks: i64,
    },

    /// The subscription was no longer due under the lock (already renewed by
    /// a concurrent pass, expired, or autopay turned off).
    NotDue,
}

/// The storage trait defining all database operations.
///
/// This trait abstracts the storage layer, allowing for different
/// implementations (e.g. `RocksDB`, in-memory for testing).
pub trait Store: Send + Sync {
    // =========================================================================
    // Account Operations
    // =========================================================================

    /// Create a new account.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AccountAlreadyExists` if the ID is taken.
    fn create_account(&self, account: &Account) -> Result<()>;

    /// Get an account by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>>;

    /// Update account metadata (status, flags) under the account lock.
    ///
    /// The closure must not touch `balance_kopeks`; balances only move
    /// through deposits and withdrawals.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn update_account(
        &self,
        account_id: &AccountId,
        update: &mut dyn FnMut(&mut Account),
    ) -> Result<Account>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Credit an account, recording the transaction atomically.
    ///
    /// Idempotent on `external_id`; see [`DepositRequest`].
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn deposit(&self, request: &DepositRequest) -> Result<DepositOutcome>;

    /// Debit an account, recording the transaction atomically.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::InsufficientFunds` if the balance cannot cover the
    ///   amount; nothing is written in that case.
    fn withdraw(
        &self,
        account_id: &AccountId,
        amount_kopeks: i64,
        kind: TransactionKind,
        description: String,
    ) -> Result<WithdrawOutcome>;

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>>;

    /// Find a completed transaction by its external idempotency key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_transaction_by_external_id(&self, external_id: &str) -> Result<Option<Transaction>>;

    /// List transactions for an account, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>>;

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Create a subscription for an account.
    ///
    /// # Errors
    ///
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::SubscriptionAlreadyExists` if one exists already.
    fn create_subscription(&self, subscription: &Subscription) -> Result<()>;

    /// Get an account's subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_subscription(&self, account_id: &AccountId) -> Result<Option<Subscription>>;

    /// Update a subscription under the account lock.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::SubscriptionNotFound` if there is none.
    fn update_subscription(
        &self,
        account_id: &AccountId,
        update: &mut dyn FnMut(&mut Subscription),
    ) -> Result<Subscription>;

    /// Apply the expiry correction to an account's subscription at `now`.
    ///
    /// This is the only place a stored status is corrected for the clock.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn resolve_expiry(
        &self,
        account_id: &AccountId,
        now: DateTime<Utc>,
    ) -> Result<Option<ExpiryOutcome>>;

    /// Charge and extend a subscription for autopay renewal.
    ///
    /// Re-checks under the account lock that the subscription is still due
    /// at `now`, so overlapping sweep passes cannot double-charge.
    ///
    /// # Errors
    ///
    /// - `StoreError::SubscriptionNotFound` if there is none.
    /// - `StoreError::InsufficientFunds` if the balance cannot cover the
    ///   price; nothing is written in that case.
    fn renew_subscription(
        &self,
        account_id: &AccountId,
        price_kopeks: i64,
        period_days: u32,
        now: DateTime<Utc>,
    ) -> Result<RenewalOutcome>;

    /// List every subscription. Used by the background sweep.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_subscriptions(&self) -> Result<Vec<Subscription>>;

    // =========================================================================
    // Promo Code Operations
    // =========================================================================

    /// Create a promo code.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the code string is taken.
    fn create_promocode(&self, promocode: &PromoCode) -> Result<()>;

    /// Get a promo code by its normalized code string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_promocode(&self, code: &str) -> Result<Option<PromoCode>>;

    /// Update a promo code under its code lock.
    ///
    /// The closure must not touch `current_uses`; that counter only moves
    /// through redemptions.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::PromoCodeNotFound` if there is none.
    fn update_promocode(
        &self,
        code: &str,
        update: &mut dyn FnMut(&mut PromoCode),
    ) -> Result<PromoCode>;

    /// List all promo codes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_promocodes(&self) -> Result<Vec<PromoCode>>;

    /// Redeem a promo code for an account.
    ///
    /// Validation follows a fixed order (not found, expired, exhausted,
    /// already used), then the redemption record, the use counter, and the
    /// code's effect commit in one atomic write under the code and account
    /// locks. A code with `max_uses = N` yields exactly N successful
    /// redemptions no matter how many calls race.
    ///
    /// A days code extends the account's subscription; when there is none it
    /// grants a paid subscription of that length with the default allowances
    /// from `trial`.
    ///
    /// # Errors
    ///
    /// - `StoreError::PromoCodeNotFound` / `PromoCodeExpired` /
    ///   `PromoCodeExhausted` / `PromoCodeAlreadyUsed` per the check order.
    /// - `StoreError::NotFound` if the account doesn't exist.
    /// - `StoreError::SubscriptionAlreadyExists` for a trial code when the
    ///   account already has a subscription.
    fn redeem_promocode(
        &self,
        account_id: &AccountId,
        code: &str,
        now: DateTime<Utc>,
        trial: &TrialParams,
    ) -> Result<RedeemedEffect>;

    // =========================================================================
    // Referral Operations
    // =========================================================================

    /// Credit a referral payout and record the earning row atomically.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the beneficiary doesn't exist.
    fn record_referral_payout(
        &self,
        earning: &ReferralEarning,
        description: String,
    ) -> Result<DepositOutcome>;

    /// List earnings for a beneficiary, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_referral_earnings(
        &self,
        account_id: &AccountId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<ReferralEarning>>;
}
