//! Promo code handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use vpn_billing_core::{AccountId, PromoCode, PromoCodeKind};
use vpn_billing_store::{RedeemedEffect, Store};

use crate::auth::{AdminAuth, ServiceAuth};
use crate::error::ApiError;
use crate::handlers::subscriptions::SubscriptionResponse;
use crate::state::AppState;
use crate::subscriptions;

/// Redeem request.
#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    /// The redeeming account.
    pub account_id: AccountId,
    /// The code as typed by the user; normalized before lookup.
    pub code: String,
}

/// Redeem response.
#[derive(Debug, Serialize)]
pub struct RedeemResponse {
    /// What the redemption did.
    pub effect: String,
    /// Balance after the credit, for balance codes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_balance_kopeks: Option<i64>,
    /// The granted or extended subscription, for subscription codes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscription: Option<SubscriptionResponse>,
}

/// Redeem a promo code.
pub async fn redeem(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<RedeemRequest>,
) -> Result<Json<RedeemResponse>, ApiError> {
    let now = Utc::now();
    let effect =
        state
            .store
            .redeem_promocode(&body.account_id, &body.code, now, &state.config.trial_params())?;

    tracing::info!(account_id = %body.account_id, code = %body.code, "Promo code redeemed");

    let response = match effect {
        RedeemedEffect::BalanceCredited {
            new_balance_kopeks, ..
        } => RedeemResponse {
            effect: "balance_credited".into(),
            new_balance_kopeks: Some(new_balance_kopeks),
            subscription: None,
        },
        RedeemedEffect::SubscriptionExtended { subscription } => {
            subscriptions::push_quota(&state, &subscription).await;
            RedeemResponse {
                effect: "subscription_extended".into(),
                new_balance_kopeks: None,
                subscription: Some(SubscriptionResponse::from(&subscription.view_at(now))),
            }
        }
        RedeemedEffect::TrialGranted { subscription } => {
            subscriptions::push_quota(&state, &subscription).await;
            RedeemResponse {
                effect: "trial_granted".into(),
                new_balance_kopeks: None,
                subscription: Some(SubscriptionResponse::from(&subscription.view_at(now))),
            }
        }
    };

    Ok(Json(response))
}

/// Promo code response.
#[derive(Debug, Serialize)]
pub struct PromoCodeResponse {
    /// Promo code ID.
    pub id: String,
    /// The normalized code string.
    pub code: String,
    /// What redeeming the code does.
    pub kind: PromoCodeKind,
    /// Maximum number of redemptions.
    pub max_uses: u32,
    /// Redemptions so far.
    pub current_uses: u32,
    /// Validity window start, if bounded.
    pub valid_from: Option<String>,
    /// Validity window end, if bounded.
    pub valid_until: Option<String>,
    /// Whether the code is active.
    pub is_active: bool,
}

impl From<&PromoCode> for PromoCodeResponse {
    fn from(promocode: &PromoCode) -> Self {
        Self {
            id: promocode.id.to_string(),
            code: promocode.code.clone(),
            kind: promocode.kind.clone(),
            max_uses: promocode.max_uses,
            current_uses: promocode.current_uses,
            valid_from: promocode.valid_from.map(|t| t.to_rfc3339()),
            valid_until: promocode.valid_until.map(|t| t.to_rfc3339()),
            is_active: promocode.is_active,
        }
    }
}

/// Create promo code request.
#[derive(Debug, Deserialize)]
pub struct CreatePromoCodeRequest {
    /// The code string; normalized (trimmed, uppercased) before storage.
    pub code: String,
    /// What redeeming the code does.
    pub kind: PromoCodeKind,
    /// Maximum number of redemptions.
    pub max_uses: u32,
    /// Validity window start.
    pub valid_from: Option<DateTime<Utc>>,
    /// Validity window end.
    pub valid_until: Option<DateTime<Utc>>,
}

/// Create a promo code.
pub async fn create(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<CreatePromoCodeRequest>,
) -> Result<Json<PromoCodeResponse>, ApiError> {
    if body.max_uses == 0 {
        return Err(ApiError::BadRequest("max_uses must be at least 1".into()));
    }
    if let PromoCodeKind::Balance { bonus_kopeks } = &body.kind {
        if *bonus_kopeks <= 0 {
            return Err(ApiError::BadRequest("Balance bonus must be positive".into()));
        }
    }
    if let PromoCodeKind::SubscriptionDays { days } = &body.kind {
        if *days == 0 {
            return Err(ApiError::BadRequest("Subscription days must be at least 1".into()));
        }
    }

    let promocode = PromoCode::new(
        &body.code,
        body.kind,
        body.max_uses,
        body.valid_from,
        body.valid_until,
    );
    state.store.create_promocode(&promocode)?;

    tracing::info!(code = %promocode.code, "Promo code created");

    Ok(Json(PromoCodeResponse::from(&promocode)))
}

/// List promo codes response.
#[derive(Debug, Serialize)]
pub struct ListPromoCodesResponse {
    /// All promo codes.
    pub promocodes: Vec<PromoCodeResponse>,
}

/// List all promo codes.
pub async fn list(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
) -> Result<Json<ListPromoCodesResponse>, ApiError> {
    let promocodes = state.store.list_promocodes()?;

    Ok(Json(ListPromoCodesResponse {
        promocodes: promocodes.iter().map(PromoCodeResponse::from).collect(),
    }))
}

/// Update promo code request.
#[derive(Debug, Deserialize)]
pub struct UpdatePromoCodeRequest {
    /// The code to update.
    pub code: String,
    /// New redemption cap; kept when omitted.
    pub max_uses: Option<u32>,
    /// New validity window end; kept when omitted.
    pub valid_until: Option<DateTime<Utc>>,
    /// New active flag; kept when omitted.
    pub is_active: Option<bool>,
}

/// Update a promo code's cap, validity window, or active flag.
pub async fn update(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<UpdatePromoCodeRequest>,
) -> Result<Json<PromoCodeResponse>, ApiError> {
    let promocode = state.store.update_promocode(&body.code, &mut |promocode| {
        if let Some(max_uses) = body.max_uses {
            promocode.max_uses = max_uses;
        }
        if let Some(valid_until) = body.valid_until {
            promocode.valid_until = Some(valid_until);
        }
        if let Some(is_active) = body.is_active {
            promocode.is_active = is_active;
        }
    })?;

    Ok(Json(PromoCodeResponse::from(&promocode)))
}

/// Deactivate request.
#[derive(Debug, Deserialize)]
pub struct DeactivatePromoCodeRequest {
    /// The code to deactivate.
    pub code: String,
}

/// Deactivate a promo code.
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<DeactivatePromoCodeRequest>,
) -> Result<Json<PromoCodeResponse>, ApiError> {
    let promocode = state.store.update_promocode(&body.code, &mut |promocode| {
        promocode.is_active = false;
    })?;

    tracing::info!(code = %promocode.code, "Promo code deactivated");

    Ok(Json(PromoCodeResponse::from(&promocode)))
}
