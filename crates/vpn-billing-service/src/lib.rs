//! VPN billing HTTP API service.
//!
//! This crate provides the HTTP API for the vpn-billing core, including:
//!
//! - Balance topups, charges, and transaction history
//! - Subscription lifecycle and administration
//! - Promo code redemption and management
//! - Referral payouts
//! - Payment gateway webhooks
//! - The autopay/expiry background sweep
//!
//! # Authentication
//!
//! Two API keys, compared in constant time:
//!
//! 1. **Service key** (`x-api-key`) - the bot front-end acting for its users
//! 2. **Admin key** (`x-admin-key`) - administrative operations

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers need async for consistency

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod ledger;
pub mod notify;
pub mod provisioning;
pub mod referrals;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod subscriptions;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use notify::{LogNotifier, NotificationSink};
pub use provisioning::{HttpProvisioningClient, ProvisioningClient, ProvisioningError, Quota};
pub use routes::create_router;
pub use scheduler::AutopayScheduler;
pub use state::AppState;
