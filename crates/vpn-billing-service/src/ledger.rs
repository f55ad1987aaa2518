//! Topup pipeline.
//!
//! Shared by the balance API handler and the payment webhook: both credit the
//! ledger through [`top_up`], so idempotency and referral processing behave
//! the same no matter where the money came from.

use vpn_billing_core::{AccountId, TransactionKind};
use vpn_billing_store::{DepositOutcome, DepositRequest, Store};

use crate::error::ApiError;
use crate::referrals;
use crate::state::AppState;

/// Credit an account with a topup.
///
/// A repeated `external_id` is absorbed by the store's idempotency check and
/// reported back as a duplicate, not an error. When this topup turns out to
/// be the account's first qualifying one, referral payouts fire after the
/// deposit has committed.
pub async fn top_up(
    state: &AppState,
    account_id: AccountId,
    amount_kopeks: i64,
    description: String,
    external_id: Option<String>,
) -> Result<DepositOutcome, ApiError> {
    if amount_kopeks <= 0 {
        return Err(ApiError::BadRequest("Topup amount must be positive".into()));
    }

    let outcome = state.store.deposit(&DepositRequest {
        account_id,
        amount_kopeks,
        kind: TransactionKind::Deposit,
        description,
        external_id,
        first_topup_threshold_kopeks: Some(state.config.referral.minimum_topup_kopeks),
    })?;

    if outcome.duplicate {
        tracing::info!(
            account_id = %account_id,
            external_id = ?outcome.transaction.external_id,
            "Duplicate payment ignored"
        );
        return Ok(outcome);
    }

    tracing::info!(
        account_id = %account_id,
        amount_kopeks = amount_kopeks,
        new_balance_kopeks = outcome.new_balance_kopeks,
        "Balance topped up"
    );

    if outcome.first_topup {
        referrals::process_first_topup(state, account_id, &outcome).await;
    }

    Ok(outcome)
}
