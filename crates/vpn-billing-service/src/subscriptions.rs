//! Subscription orchestration.
//!
//! Every operation here follows the same shape: commit locally first, then
//! push the resulting quota to the provisioning backend. The push is
//! best-effort; a remote failure is logged and the local state stands.

use chrono::Utc;

use vpn_billing_core::{AccountId, Subscription, SubscriptionView};
use vpn_billing_store::Store;

use crate::error::ApiError;
use crate::provisioning::Quota;
use crate::state::AppState;

/// Read an account's subscription, resolving expiry first.
///
/// This is the only exposed read of a subscription's status, so a stale
/// `active` row is corrected (and the backend disabled) before anyone sees it.
pub async fn resolved_view(
    state: &AppState,
    account_id: AccountId,
) -> Result<Option<SubscriptionView>, ApiError> {
    let now = Utc::now();
    let Some(outcome) = state.store.resolve_expiry(&account_id, now)? else {
        return Ok(None);
    };

    if outcome.transitioned {
        tracing::info!(account_id = %account_id, "Subscription expired");
        push_disable(state, &outcome.subscription).await;
    }

    Ok(Some(outcome.subscription.view_at(now)))
}

/// Push a subscription's quota to the provisioning backend.
///
/// Creates the backend user on first push and stores the returned handle;
/// later pushes update in place.
pub async fn push_quota(state: &AppState, subscription: &Subscription) {
    let Some(client) = &state.provisioning else {
        return;
    };

    let quota = Quota::from_subscription(subscription);
    let account_id = subscription.account_id;

    match &subscription.provisioning_handle {
        Some(handle) => {
            if let Err(e) = client.update_user(handle, &quota).await {
                tracing::warn!(account_id = %account_id, error = %e, "Provisioning update failed");
            }
        }
        None => match client.create_user(account_id, &quota).await {
            Ok(handle) => {
                let saved = state.store.update_subscription(&account_id, &mut |sub| {
                    sub.provisioning_handle = Some(handle.clone());
                });
                if let Err(e) = saved {
                    tracing::error!(
                        account_id = %account_id,
                        error = %e,
                        "Failed to store provisioning handle"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(account_id = %account_id, error = %e, "Provisioning create failed");
            }
        },
    }
}

/// Disable a subscription's backend user.
pub async fn push_disable(state: &AppState, subscription: &Subscription) {
    let Some(client) = &state.provisioning else {
        return;
    };
    let Some(handle) = &subscription.provisioning_handle else {
        return;
    };

    if let Err(e) = client.disable_user(handle).await {
        tracing::warn!(
            account_id = %subscription.account_id,
            error = %e,
            "Provisioning disable failed"
        );
    }
}

/// Drop a subscription's registered devices in the backend.
pub async fn push_reset_devices(state: &AppState, subscription: &Subscription) {
    let Some(client) = &state.provisioning else {
        return;
    };
    let Some(handle) = &subscription.provisioning_handle else {
        return;
    };

    if let Err(e) = client.reset_devices(handle).await {
        tracing::warn!(
            account_id = %subscription.account_id,
            error = %e,
            "Provisioning device reset failed"
        );
    }
}
