//! Core types for the vpn-billing service.
//!
//! This crate provides the foundational types used throughout vpn-billing:
//!
//! - **Identifiers**: `AccountId`, `TransactionId`, `PromoCodeId`,
//!   `ServerGroupId`, `EarningId`
//! - **Accounts**: `Account`, `AccountStatus`
//! - **Ledger**: `Transaction`, `TransactionKind`
//! - **Subscriptions**: `Subscription`, `SubscriptionStatus`, `SubscriptionView`
//! - **Promo codes**: `PromoCode`, `PromoCodeKind`, `PromoCodeUse`
//! - **Referrals**: `ReferralEarning`, `EarningReason`
//! - **Pricing**: `PricingConfig`
//!
//! # Money
//!
//! All monetary amounts are integer **kopeks** stored as `i64`. There is no
//! floating point money anywhere; 100 kopeks = 1 RUB.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod ids;
pub mod pricing;
pub mod promocode;
pub mod referral;
pub mod subscription;
pub mod transaction;

pub use account::{Account, AccountStatus};
pub use ids::{AccountId, EarningId, IdError, PromoCodeId, ServerGroupId, TransactionId};
pub use pricing::{
    PricingConfig, DEFAULT_DEVICE_LIMIT, MAX_DEVICE_LIMIT, PRICE_PER_DEVICE_KOPEKS,
    TRIAL_DEVICE_LIMIT, TRIAL_DURATION_DAYS, TRIAL_TRAFFIC_LIMIT_GB,
};
pub use promocode::{normalize_code, PromoCode, PromoCodeKind, PromoCodeUse};
pub use referral::{EarningReason, ReferralEarning};
pub use subscription::{
    Subscription, SubscriptionStatus, SubscriptionView, UNLIMITED_TRAFFIC_GB,
};
pub use transaction::{Transaction, TransactionKind};
