//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary account records, keyed by `account_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Subscriptions, keyed by `account_id` (1:1 with accounts).
    pub const SUBSCRIPTIONS: &str = "subscriptions";

    /// Ledger transactions, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by account, keyed by `account_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_ACCOUNT: &str = "transactions_by_account";

    /// Index: external idempotency key to transaction ID.
    pub const TRANSACTIONS_BY_EXTERNAL_ID: &str = "transactions_by_external_id";

    /// Promo codes, keyed by normalized code string.
    pub const PROMOCODES: &str = "promocodes";

    /// Redemption records, keyed by `promocode_id || account_id`.
    pub const PROMOCODE_USES: &str = "promocode_uses";

    /// Referral earnings, keyed by `earning_id` (ULID).
    pub const REFERRAL_EARNINGS: &str = "referral_earnings";

    /// Index: earnings by beneficiary, keyed by `account_id || earning_id`.
    /// Value is empty (index only).
    pub const EARNINGS_BY_ACCOUNT: &str = "earnings_by_account";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::SUBSCRIPTIONS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_ACCOUNT,
        cf::TRANSACTIONS_BY_EXTERNAL_ID,
        cf::PROMOCODES,
        cf::PROMOCODE_USES,
        cf::REFERRAL_EARNINGS,
        cf::EARNINGS_BY_ACCOUNT,
    ]
}
