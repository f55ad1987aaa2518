//! API handlers.

pub mod accounts;
pub mod balance;
pub mod health;
pub mod promocodes;
pub mod referrals;
pub mod subscriptions;
pub mod webhooks;
