//! Account handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use vpn_billing_core::{Account, AccountId, AccountStatus};
use vpn_billing_store::Store;

use crate::auth::{AdminAuth, ServiceAuth};
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// Account ID.
    pub id: String,
    /// Balance in kopeks.
    pub balance_kopeks: i64,
    /// Whether the account has made its first qualifying topup.
    pub has_made_first_topup: bool,
    /// Whether the account ever had a paid subscription.
    pub has_had_paid_subscription: bool,
    /// The inviting account, if this account was referred.
    pub referred_by: Option<String>,
    /// Account status.
    pub status: String,
    /// Creation timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.to_string(),
            balance_kopeks: account.balance_kopeks,
            has_made_first_topup: account.has_made_first_topup,
            has_had_paid_subscription: account.has_had_paid_subscription,
            referred_by: account.referred_by.map(|id| id.to_string()),
            status: format!("{:?}", account.status).to_lowercase(),
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Create account request.
#[derive(Debug, Deserialize)]
pub struct CreateAccountRequest {
    /// Account ID to create; generated when omitted.
    pub account_id: Option<AccountId>,
    /// The inviting account for the referral program.
    pub referred_by: Option<AccountId>,
}

/// Create a new account.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<CreateAccountRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account_id = body.account_id.unwrap_or_else(AccountId::generate);

    if let Some(inviter_id) = body.referred_by {
        if inviter_id == account_id {
            return Err(ApiError::BadRequest("An account cannot refer itself".into()));
        }
        let inviter = state
            .store
            .get_account(&inviter_id)?
            .ok_or_else(|| ApiError::BadRequest(format!("Unknown inviter: {inviter_id}")))?;
        if inviter.status != AccountStatus::Active {
            return Err(ApiError::BadRequest(format!("Inviter is not active: {inviter_id}")));
        }
    }

    let account = Account::new(account_id, body.referred_by);
    state.store.create_account(&account)?;

    tracing::info!(account_id = %account_id, referred_by = ?body.referred_by, "Account created");

    Ok(Json(AccountResponse::from(&account)))
}

/// Get an account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(account_id): Path<AccountId>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state
        .store
        .get_account(&account_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Account not found: {account_id}")))?;

    Ok(Json(AccountResponse::from(&account)))
}
