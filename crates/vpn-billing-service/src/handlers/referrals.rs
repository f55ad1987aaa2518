//! Referral earnings handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use vpn_billing_core::{AccountId, EarningReason, ReferralEarning};
use vpn_billing_store::Store;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Earnings list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListEarningsQuery {
    /// The beneficiary account.
    pub account_id: AccountId,
    /// Maximum number of earnings to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Referral earning response.
#[derive(Debug, Serialize)]
pub struct EarningResponse {
    /// Earning ID.
    pub id: String,
    /// The referred account whose topup triggered the payout.
    pub referred_id: String,
    /// Payout amount in kopeks.
    pub amount_kopeks: i64,
    /// Why the payout happened.
    pub reason: String,
    /// Timestamp.
    pub created_at: String,
}

impl From<&ReferralEarning> for EarningResponse {
    fn from(earning: &ReferralEarning) -> Self {
        Self {
            id: earning.id.to_string(),
            referred_id: earning.referred_id.to_string(),
            amount_kopeks: earning.amount_kopeks,
            reason: match earning.reason {
                EarningReason::FirstTopupBonus => "first_topup_bonus",
                EarningReason::TopupCommission => "topup_commission",
            }
            .to_string(),
            created_at: earning.created_at.to_rfc3339(),
        }
    }
}

/// List earnings response.
#[derive(Debug, Serialize)]
pub struct ListEarningsResponse {
    /// Earnings (newest first).
    pub earnings: Vec<EarningResponse>,
    /// Total paid out across the listed earnings, in kopeks.
    pub total_kopeks: i64,
}

/// List an account's referral earnings, newest first.
pub async fn list_earnings(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Query(query): Query<ListEarningsQuery>,
) -> Result<Json<ListEarningsResponse>, ApiError> {
    let limit = query.limit.min(100);
    let earnings = state
        .store
        .list_referral_earnings(&query.account_id, limit, query.offset)?;

    let total_kopeks = earnings.iter().map(|e| e.amount_kopeks).sum();

    Ok(Json(ListEarningsResponse {
        earnings: earnings.iter().map(EarningResponse::from).collect(),
        total_kopeks,
    }))
}
