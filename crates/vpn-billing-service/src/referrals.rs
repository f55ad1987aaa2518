//! Referral payouts.
//!
//! Payouts fire exactly once per referred account: the ledger flips the
//! first-topup flag atomically with the qualifying deposit, and only the
//! deposit that observed the flip reaches this module. The payouts themselves
//! are separate credits; a failure here is logged and escalated to the
//! operator, never unwound into the topup that triggered it.

use vpn_billing_core::{AccountId, EarningReason, ReferralEarning, TransactionKind};
use vpn_billing_store::{DepositOutcome, DepositRequest, Store};

use crate::state::AppState;

/// Pay out the referral bonuses for a qualifying first topup.
pub async fn process_first_topup(
    state: &AppState,
    account_id: AccountId,
    outcome: &DepositOutcome,
) {
    let account = match state.store.get_account(&account_id) {
        Ok(Some(account)) => account,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(account_id = %account_id, error = %e, "Referral lookup failed");
            return;
        }
    };

    let Some(inviter_id) = account.referred_by else {
        return;
    };

    let referral = &state.config.referral;
    let source_transaction = outcome.transaction.id;

    // Bonus to the referred account itself.
    if referral.referred_bonus_kopeks > 0 {
        let request = DepositRequest {
            account_id,
            amount_kopeks: referral.referred_bonus_kopeks,
            kind: TransactionKind::ReferralReward,
            description: "First topup bonus".into(),
            external_id: None,
            first_topup_threshold_kopeks: None,
        };
        match state.store.deposit(&request) {
            Ok(_) => {
                state
                    .notifier
                    .notify_user(account_id, "Your first topup bonus has been credited")
                    .await;
            }
            Err(e) => {
                tracing::error!(account_id = %account_id, error = %e, "Referred bonus failed");
                state
                    .notifier
                    .notify_admin(&format!("Referred bonus failed for {account_id}: {e}"))
                    .await;
            }
        }
    }

    // Fixed bonus plus commission on the topup amount, to the inviter.
    let commission_kopeks =
        outcome.transaction.amount_kopeks * referral.commission_percent / 100;

    let payouts = [
        (referral.inviter_bonus_kopeks, EarningReason::FirstTopupBonus),
        (commission_kopeks, EarningReason::TopupCommission),
    ];

    for (amount_kopeks, reason) in payouts {
        if amount_kopeks <= 0 {
            continue;
        }

        let earning = ReferralEarning::new(
            inviter_id,
            account_id,
            amount_kopeks,
            reason,
            Some(source_transaction),
        );
        let description = match reason {
            EarningReason::FirstTopupBonus => format!("Referral bonus for inviting {account_id}"),
            EarningReason::TopupCommission => format!("Referral commission from {account_id}"),
        };

        if let Err(e) = state.store.record_referral_payout(&earning, description) {
            tracing::error!(
                inviter_id = %inviter_id,
                referred_id = %account_id,
                reason = ?reason,
                error = %e,
                "Referral payout failed"
            );
            state
                .notifier
                .notify_admin(&format!("Referral payout failed for {inviter_id}: {e}"))
                .await;
        }
    }

    state
        .notifier
        .notify_user(
            inviter_id,
            "Your referral made their first topup - bonuses credited",
        )
        .await;
}
