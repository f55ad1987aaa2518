//! Balance and transaction handlers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use vpn_billing_core::{AccountId, Transaction, TransactionKind};
use vpn_billing_store::Store;

use crate::auth::{AdminAuth, ServiceAuth};
use crate::error::ApiError;
use crate::ledger;
use crate::state::AppState;

/// Topup request.
#[derive(Debug, Deserialize)]
pub struct TopupRequest {
    /// The account to credit.
    pub account_id: AccountId,
    /// Amount in kopeks, must be positive.
    pub amount_kopeks: i64,
    /// Optional ledger description.
    pub description: Option<String>,
    /// Idempotency key from the payment provider.
    pub external_id: Option<String>,
}

/// Topup response.
#[derive(Debug, Serialize)]
pub struct TopupResponse {
    /// The ledger transaction ID.
    pub transaction_id: String,
    /// Balance after the topup.
    pub new_balance_kopeks: i64,
    /// Whether this request repeated an already-processed external ID.
    pub duplicate: bool,
}

/// Credit an account's balance.
pub async fn top_up(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<TopupRequest>,
) -> Result<Json<TopupResponse>, ApiError> {
    let description = body.description.unwrap_or_else(|| "Balance topup".into());

    let outcome = ledger::top_up(
        &state,
        body.account_id,
        body.amount_kopeks,
        description,
        body.external_id,
    )
    .await?;

    Ok(Json(TopupResponse {
        transaction_id: outcome.transaction.id.to_string(),
        new_balance_kopeks: outcome.new_balance_kopeks,
        duplicate: outcome.duplicate,
    }))
}

/// Charge request.
#[derive(Debug, Deserialize)]
pub struct ChargeRequest {
    /// The account to debit.
    pub account_id: AccountId,
    /// Amount in kopeks, must be positive.
    pub amount_kopeks: i64,
    /// Optional ledger description.
    pub description: Option<String>,
}

/// Charge response.
#[derive(Debug, Serialize)]
pub struct ChargeResponse {
    /// The ledger transaction ID.
    pub transaction_id: String,
    /// Balance after the charge.
    pub new_balance_kopeks: i64,
}

/// Debit an account's balance.
///
/// Fails with 402 and no mutation when the balance cannot cover the amount.
pub async fn charge(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Json(body): Json<ChargeRequest>,
) -> Result<Json<ChargeResponse>, ApiError> {
    if body.amount_kopeks <= 0 {
        return Err(ApiError::BadRequest("Charge amount must be positive".into()));
    }

    let description = body.description.unwrap_or_else(|| "Balance charge".into());
    let outcome = state.store.withdraw(
        &body.account_id,
        body.amount_kopeks,
        TransactionKind::Withdrawal,
        description,
    )?;

    Ok(Json(ChargeResponse {
        transaction_id: outcome.transaction.id.to_string(),
        new_balance_kopeks: outcome.new_balance_kopeks,
    }))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// The account whose transactions to list.
    pub account_id: AccountId,
    /// Maximum number of transactions to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// Transaction response.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Transaction kind.
    pub kind: String,
    /// Amount in kopeks, always positive; sign is implied by the kind.
    pub amount_kopeks: i64,
    /// Signed amount in kopeks (positive = credit, negative = debit).
    pub signed_amount_kopeks: i64,
    /// Description.
    pub description: String,
    /// External idempotency key, if any.
    pub external_id: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            kind: match tx.kind {
                TransactionKind::Deposit => "deposit",
                TransactionKind::Withdrawal => "withdrawal",
                TransactionKind::SubscriptionPayment => "subscription_payment",
                TransactionKind::Refund => "refund",
                TransactionKind::ReferralReward => "referral_reward",
            }
            .to_string(),
            amount_kopeks: tx.amount_kopeks,
            signed_amount_kopeks: tx.signed_amount(),
            description: tx.description.clone(),
            external_id: tx.external_id.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List transaction history, newest first.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    state
        .store
        .get_account(&query.account_id)?
        .ok_or_else(|| ApiError::NotFound(format!("Account not found: {}", query.account_id)))?;

    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(100);
    let transactions = state
        .store
        .list_transactions(&query.account_id, limit + 1, query.offset)?;

    let has_more = transactions.len() > limit;
    let transactions: Vec<_> = transactions
        .iter()
        .take(limit)
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}

/// Admin balance adjustment request.
#[derive(Debug, Deserialize)]
pub struct AdjustBalanceRequest {
    /// The account to adjust.
    pub account_id: AccountId,
    /// Signed amount in kopeks; positive credits, negative debits.
    pub amount_kopeks: i64,
    /// Reason recorded in the ledger.
    pub description: String,
}

/// Manually adjust an account's balance.
///
/// Credits are recorded as refunds and never count as topups for the
/// referral program; debits fail with 402 like any other charge.
pub async fn adjust_balance(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Json(body): Json<AdjustBalanceRequest>,
) -> Result<Json<ChargeResponse>, ApiError> {
    if body.amount_kopeks == 0 {
        return Err(ApiError::BadRequest("Adjustment amount must be non-zero".into()));
    }

    let (transaction_id, new_balance_kopeks) = if body.amount_kopeks > 0 {
        let outcome = state.store.deposit(&vpn_billing_store::DepositRequest {
            account_id: body.account_id,
            amount_kopeks: body.amount_kopeks,
            kind: TransactionKind::Refund,
            description: body.description,
            external_id: None,
            first_topup_threshold_kopeks: None,
        })?;
        (outcome.transaction.id, outcome.new_balance_kopeks)
    } else {
        // i64::MIN has no positive counterpart.
        let amount_kopeks = body
            .amount_kopeks
            .checked_neg()
            .ok_or_else(|| ApiError::BadRequest("Adjustment amount is out of range".into()))?;
        let outcome = state.store.withdraw(
            &body.account_id,
            amount_kopeks,
            TransactionKind::Withdrawal,
            body.description,
        )?;
        (outcome.transaction.id, outcome.new_balance_kopeks)
    };

    tracing::info!(
        account_id = %body.account_id,
        amount_kopeks = body.amount_kopeks,
        "Admin balance adjustment"
    );

    Ok(Json(ChargeResponse {
        transaction_id: transaction_id.to_string(),
        new_balance_kopeks,
    }))
}
