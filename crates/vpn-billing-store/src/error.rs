//! Error types for vpn-billing storage.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of record ("account", "transaction", ...).
        entity: &'static str,
        /// The identifier that was looked up.
        id: String,
    },

    /// Account already exists.
    #[error("account already exists: {account_id}")]
    AccountAlreadyExists {
        /// The account ID that already exists.
        account_id: String,
    },

    /// The account already has a subscription.
    #[error("subscription already exists for account: {account_id}")]
    SubscriptionAlreadyExists {
        /// The account ID that already has a subscription.
        account_id: String,
    },

    /// The account has no subscription.
    #[error("no subscription for account: {account_id}")]
    SubscriptionNotFound {
        /// The account ID without a subscription.
        account_id: String,
    },

    /// Insufficient balance for a debit.
    #[error("insufficient funds: balance={balance}, required={required}")]
    InsufficientFunds {
        /// Current balance in kopeks.
        balance: i64,
        /// Required amount in kopeks.
        required: i64,
    },

    /// Promo code does not exist.
    #[error("promo code not found: {code}")]
    PromoCodeNotFound {
        /// The normalized code that was looked up.
        code: String,
    },

    /// Promo code is inactive or outside its validity window.
    #[error("promo code expired: {code}")]
    PromoCodeExpired {
        /// The normalized code.
        code: String,
    },

    /// Promo code has no redemptions left.
    #[error("promo code exhausted: {code}")]
    PromoCodeExhausted {
        /// The normalized code.
        code: String,
    },

    /// The account already redeemed this code.
    #[error("promo code already used by account: {code}")]
    PromoCodeAlreadyUsed {
        /// The normalized code.
        code: String,
    },

    /// A concurrent writer invalidated this operation; safe to retry.
    #[error("concurrent update conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Whether retrying the operation may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}
