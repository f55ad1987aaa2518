//! Subscription handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use vpn_billing_core::{
    AccountId, ServerGroupId, Subscription, SubscriptionStatus, SubscriptionView,
    MAX_DEVICE_LIMIT,
};
use vpn_billing_store::Store;

use crate::auth::{AdminAuth, ServiceAuth};
use crate::error::ApiError;
use crate::state::AppState;
use crate::subscriptions;

/// Subscription response.
#[derive(Debug, Serialize)]
pub struct SubscriptionResponse {
    /// The owning account.
    pub account_id: String,
    /// Status after expiry resolution.
    pub status: String,
    /// Whether this is still an unpaid trial.
    pub is_trial: bool,
    /// When the subscription ends.
    pub end_date: String,
    /// Whole days remaining, never negative.
    pub days_left: i64,
    /// Traffic allowance in GB; `0` means unlimited.
    pub traffic_limit_gb: u32,
    /// Traffic used in GB.
    pub traffic_used_gb: f64,
    /// Device limit.
    pub device_limit: u32,
    /// Granted server groups.
    pub connected_groups: Vec<String>,
    /// Whether autopay is on.
    pub autopay_enabled: bool,
    /// Autopay lead time in days.
    pub autopay_days_before: u32,
}

impl From<&SubscriptionView> for SubscriptionResponse {
    fn from(view: &SubscriptionView) -> Self {
        Self {
            account_id: view.account_id.to_string(),
            status: format!("{:?}", view.status).to_lowercase(),
            is_trial: view.is_trial,
            end_date: view.end_date.to_rfc3339(),
            days_left: view.days_left,
            traffic_limit_gb: view.traffic_limit_gb,
            traffic_used_gb: view.traffic_used_gb,
            device_limit: view.device_limit,
            connected_groups: view.connected_groups.iter().map(ToString::to_string).collect(),
            autopay_enabled: view.autopay_enabled,
            autopay_days_before: view.autopay_days_before,
        }
    }
}

/// Build the response for a subscription as it stands right now.
fn respond(subscription: &Subscription) -> Json<SubscriptionResponse> {
    Json(SubscriptionResponse::from(&subscription.view_at(Utc::now())))
}

/// Subscription query parameters.
#[derive(Debug, Deserialize)]
pub struct SubscriptionQuery {
    /// The account whose subscription to read.
    pub account_id: AccountId,
}

/// Get an account's subscription, resolving expiry first.
pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Query(query): Query<SubscriptionQuery>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let view = subscriptions::resolved_view(&state, query.account_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No subscription for account: {}", query.account_id))
        })?;

    Ok(Json(SubscriptionResponse::from(&view)))
}

/// Autopay settings request.
#[derive(Debug, Deserialize)]
pub struct AutopayRequest {
    /// The account whose subscription to update.
    pub account_id: AccountId,
    /// Whether the renewal sweep should auto-charge this subscription.
    pub enabled: bool,
    /// Lead time in days; kept when omitted.
    pub days_before: Option<u32>,
}

/// Turn autopay on or off for a subscription.
pub async fn set_autopay(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<AutopayRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let subscription = state
        .store
        .update_subscription(&body.account_id, &mut |sub| {
            sub.autopay_enabled = body.enabled;
            if let Some(days_before) = body.days_before {
                sub.autopay_days_before = days_before;
            }
        })?;

    Ok(respond(&subscription))
}

/// Admin grant-trial request.
#[derive(Debug, Deserialize)]
pub struct GrantTrialRequest {
    /// The account to grant a trial to.
    pub account_id: AccountId,
}

/// Grant a trial subscription with the configured defaults.
pub async fn grant_trial(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<GrantTrialRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let trial = &state.config.trial;
    let subscription = Subscription::trial(
        body.account_id,
        trial.duration_days,
        trial.traffic_limit_gb,
        trial.device_limit,
        trial.server_group,
        state.config.autopay.default_days_before,
    );

    state.store.create_subscription(&subscription)?;
    tracing::info!(account_id = %body.account_id, "Trial subscription granted");

    subscriptions::push_quota(&state, &subscription).await;

    Ok(respond(&subscription))
}

/// Admin grant-paid request.
#[derive(Debug, Deserialize)]
pub struct GrantPaidRequest {
    /// The account to grant a subscription to.
    pub account_id: AccountId,
    /// Period in days.
    pub period_days: u32,
    /// Traffic allowance in GB (0 = unlimited).
    pub traffic_limit_gb: u32,
    /// Device allowance.
    pub device_limit: u32,
    /// Granted server groups.
    #[serde(default)]
    pub groups: Vec<ServerGroupId>,
}

/// Grant a paid subscription without charging.
pub async fn grant_paid(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<GrantPaidRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    if body.device_limit > MAX_DEVICE_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "Device limit exceeds maximum of {MAX_DEVICE_LIMIT}"
        )));
    }

    let subscription = Subscription::paid(
        body.account_id,
        body.period_days,
        body.traffic_limit_gb,
        body.device_limit,
        body.groups,
        state.config.autopay.default_days_before,
    );

    state.store.create_subscription(&subscription)?;
    state.store.update_account(&body.account_id, &mut |account| {
        account.has_had_paid_subscription = true;
    })?;

    tracing::info!(
        account_id = %body.account_id,
        period_days = body.period_days,
        "Paid subscription granted"
    );

    subscriptions::push_quota(&state, &subscription).await;

    Ok(respond(&subscription))
}

/// Admin extend request.
#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    /// The account whose subscription to extend.
    pub account_id: AccountId,
    /// Days to add on top of the current end date (or now, if already past).
    pub days: u32,
}

/// Extend a subscription.
pub async fn extend(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<ExtendRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    if body.days == 0 {
        return Err(ApiError::BadRequest("Extension must be at least one day".into()));
    }

    let now = Utc::now();
    let subscription = state
        .store
        .update_subscription(&body.account_id, &mut |sub| {
            sub.extend(now, body.days);
        })?;

    subscriptions::push_quota(&state, &subscription).await;

    Ok(respond(&subscription))
}

/// Admin traffic limit request.
#[derive(Debug, Deserialize)]
pub struct TrafficLimitRequest {
    /// The account whose subscription to update.
    pub account_id: AccountId,
    /// New traffic allowance in GB (0 = unlimited).
    pub traffic_limit_gb: u32,
}

/// Change a subscription's traffic allowance.
pub async fn set_traffic_limit(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<TrafficLimitRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let subscription = state
        .store
        .update_subscription(&body.account_id, &mut |sub| {
            sub.traffic_limit_gb = body.traffic_limit_gb;
        })?;

    subscriptions::push_quota(&state, &subscription).await;

    Ok(respond(&subscription))
}

/// Admin device limit request.
#[derive(Debug, Deserialize)]
pub struct DeviceLimitRequest {
    /// The account whose subscription to update.
    pub account_id: AccountId,
    /// New device allowance.
    pub device_limit: u32,
}

/// Change a subscription's device allowance.
pub async fn set_device_limit(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<DeviceLimitRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    if body.device_limit == 0 || body.device_limit > MAX_DEVICE_LIMIT {
        return Err(ApiError::BadRequest(format!(
            "Device limit must be between 1 and {MAX_DEVICE_LIMIT}"
        )));
    }

    let subscription = state
        .store
        .update_subscription(&body.account_id, &mut |sub| {
            sub.device_limit = body.device_limit;
        })?;

    subscriptions::push_quota(&state, &subscription).await;

    Ok(respond(&subscription))
}

/// Admin server group toggle request.
#[derive(Debug, Deserialize)]
pub struct ToggleGroupRequest {
    /// The account whose subscription to update.
    pub account_id: AccountId,
    /// The server group to add or remove.
    pub group_id: ServerGroupId,
}

/// Add a server group to a subscription, or remove it if already granted.
pub async fn toggle_server_group(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<ToggleGroupRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let subscription = state
        .store
        .update_subscription(&body.account_id, &mut |sub| {
            if let Some(position) = sub.connected_groups.iter().position(|g| *g == body.group_id) {
                sub.connected_groups.remove(position);
            } else {
                sub.connected_groups.push(body.group_id);
            }
        })?;

    subscriptions::push_quota(&state, &subscription).await;

    Ok(respond(&subscription))
}

/// Admin activate/deactivate request.
#[derive(Debug, Deserialize)]
pub struct StatusOverrideRequest {
    /// The account whose subscription to override.
    pub account_id: AccountId,
}

/// Administratively disable a subscription.
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<StatusOverrideRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let subscription = state
        .store
        .update_subscription(&body.account_id, &mut |sub| {
            sub.status = SubscriptionStatus::Disabled;
        })?;

    tracing::info!(account_id = %body.account_id, "Subscription deactivated");
    subscriptions::push_disable(&state, &subscription).await;

    Ok(respond(&subscription))
}

/// Lift an administrative disable.
///
/// The subscription comes back as active; if its end date has already passed
/// the immediate expiry resolution sends it straight to expired.
pub async fn activate(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<StatusOverrideRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    state
        .store
        .update_subscription(&body.account_id, &mut |sub| {
            if sub.status == SubscriptionStatus::Disabled {
                sub.status = SubscriptionStatus::Active;
            }
        })?;

    let view = subscriptions::resolved_view(&state, body.account_id)
        .await?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No subscription for account: {}", body.account_id))
        })?;

    if view.status == SubscriptionStatus::Active {
        if let Some(subscription) = state.store.get_subscription(&body.account_id)? {
            subscriptions::push_quota(&state, &subscription).await;
        }
    }

    tracing::info!(account_id = %body.account_id, "Subscription reactivated");

    Ok(Json(SubscriptionResponse::from(&view)))
}

/// Drop a subscription's registered devices in the provisioning backend.
pub async fn reset_devices(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<StatusOverrideRequest>,
) -> Result<Json<SubscriptionResponse>, ApiError> {
    let subscription = state
        .store
        .get_subscription(&body.account_id)?
        .ok_or_else(|| {
            ApiError::NotFound(format!("No subscription for account: {}", body.account_id))
        })?;

    subscriptions::push_reset_devices(&state, &subscription).await;

    Ok(respond(&subscription))
}
