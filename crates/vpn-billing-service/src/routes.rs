//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, balance, health, promocodes, referrals, subscriptions, webhooks};
use crate::state::AppState;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Service API (`x-api-key`)
/// - `GET /v1/accounts/:account_id` - Get account
/// - `POST /v1/balance/topup` - Credit balance (idempotent on external ID)
/// - `POST /v1/balance/charge` - Debit balance
/// - `GET /v1/balance/transactions` - List transaction history
/// - `POST /v1/promocodes/redeem` - Redeem a promo code
/// - `GET /v1/subscription` - Read subscription (resolves expiry first)
/// - `POST /v1/subscription/autopay` - Configure autopay
/// - `GET /v1/referrals/earnings` - List referral earnings
///
/// ## Admin API (`x-admin-key`)
/// - `POST /v1/admin/accounts` - Create account
/// - `POST /v1/admin/balance/adjust` - Manual balance adjustment
/// - `POST /v1/admin/subscriptions/*` - Grant, extend, limits, groups,
///   activate/deactivate, device reset
/// - `POST /v1/admin/promocodes*` - Promo code management
///
/// ## Webhooks (signature verification)
/// - `POST /webhooks/payment` - Payment gateway notifications
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    let admin_routes = Router::new()
        .route("/accounts", post(accounts::create_account))
        .route("/balance/adjust", post(balance::adjust_balance))
        .route("/subscriptions/grant-trial", post(subscriptions::grant_trial))
        .route("/subscriptions/grant-paid", post(subscriptions::grant_paid))
        .route("/subscriptions/extend", post(subscriptions::extend))
        .route(
            "/subscriptions/traffic-limit",
            post(subscriptions::set_traffic_limit),
        )
        .route(
            "/subscriptions/device-limit",
            post(subscriptions::set_device_limit),
        )
        .route(
            "/subscriptions/toggle-group",
            post(subscriptions::toggle_server_group),
        )
        .route("/subscriptions/activate", post(subscriptions::activate))
        .route("/subscriptions/deactivate", post(subscriptions::deactivate))
        .route(
            "/subscriptions/reset-devices",
            post(subscriptions::reset_devices),
        )
        .route("/promocodes", post(promocodes::create).get(promocodes::list))
        .route("/promocodes/update", post(promocodes::update))
        .route("/promocodes/deactivate", post(promocodes::deactivate));

    let api_routes = Router::new()
        .route("/accounts/:account_id", get(accounts::get_account))
        .route("/balance/topup", post(balance::top_up))
        .route("/balance/charge", post(balance::charge))
        .route("/balance/transactions", get(balance::list_transactions))
        .route("/promocodes/redeem", post(promocodes::redeem))
        .route("/subscription", get(subscriptions::get_subscription))
        .route("/subscription/autopay", post(subscriptions::set_autopay))
        .route("/referrals/earnings", get(referrals::list_earnings))
        .nest("/admin", admin_routes)
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by the payment gateway)
        .route("/webhooks/payment", post(webhooks::payment_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
