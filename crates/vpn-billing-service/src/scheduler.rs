//! Autopay and expiry sweep.
//!
//! A fixed-interval background task walks every subscription, charges the
//! ones whose autopay window has opened, and expires the ones that ran out.
//! The store re-checks the due window under the account lock, so overlapping
//! sweep passes (or a sweep racing a manual renewal) never double-charge.
//!
//! Shutdown is checked between accounts; the in-flight account's store
//! operation always completes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

use vpn_billing_core::Subscription;
use vpn_billing_store::{RenewalOutcome, Store, StoreError};

use crate::state::AppState;
use crate::subscriptions;

/// Background sweep over all subscriptions.
pub struct AutopayScheduler {
    state: Arc<AppState>,
    shutdown: watch::Receiver<bool>,
}

impl AutopayScheduler {
    /// Create a scheduler bound to a shutdown signal.
    #[must_use]
    pub fn new(state: Arc<AppState>, shutdown: watch::Receiver<bool>) -> Self {
        Self { state, shutdown }
    }

    /// Run the sweep loop until the shutdown signal fires.
    pub async fn run(mut self) {
        let mut interval = tokio::time::interval(Duration::from_secs(
            self.state.config.autopay.sweep_interval_seconds,
        ));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(
            interval_seconds = self.state.config.autopay.sweep_interval_seconds,
            "Autopay scheduler started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.sweep_at(Utc::now()).await;
                }
                _ = self.shutdown.changed() => {
                    tracing::info!("Autopay scheduler stopping");
                    break;
                }
            }
        }
    }

    /// Run one sweep pass at `now`.
    pub async fn sweep_at(&self, now: DateTime<Utc>) {
        let subscriptions = match self.state.store.list_subscriptions() {
            Ok(subscriptions) => subscriptions,
            Err(e) => {
                tracing::error!(error = %e, "Sweep failed to list subscriptions");
                return;
            }
        };

        for subscription in subscriptions {
            if *self.shutdown.borrow() {
                tracing::info!("Sweep interrupted by shutdown");
                break;
            }

            let renewed = if subscription.is_autopay_due(now) {
                self.renew(&subscription, now).await
            } else {
                false
            };

            if !renewed && subscription.is_expiry_due(now) {
                self.expire(&subscription, now).await;
            }
        }
    }

    /// Attempt an autopay renewal. Returns whether a renewal was charged.
    async fn renew(&self, subscription: &Subscription, now: DateTime<Utc>) -> bool {
        let account_id = subscription.account_id;
        let period_days = self.state.config.autopay.renewal_period_days;

        let Some(price_kopeks) = self
            .state
            .config
            .pricing
            .renewal_price(subscription, period_days)
        else {
            tracing::warn!(
                account_id = %account_id,
                period_days = period_days,
                "No price for renewal period, skipping"
            );
            return false;
        };

        match self
            .state
            .store
            .renew_subscription(&account_id, price_kopeks, period_days, now)
        {
            Ok(RenewalOutcome::Renewed {
                subscription,
                new_balance_kopeks,
                ..
            }) => {
                tracing::info!(
                    account_id = %account_id,
                    price_kopeks = price_kopeks,
                    new_balance_kopeks = new_balance_kopeks,
                    "Subscription auto-renewed"
                );
                subscriptions::push_quota(&self.state, &subscription).await;
                self.state
                    .notifier
                    .notify_user(account_id, "Your subscription was renewed automatically")
                    .await;
                true
            }
            Ok(RenewalOutcome::NotDue) => false,
            Err(StoreError::InsufficientFunds { balance, required }) => {
                tracing::info!(
                    account_id = %account_id,
                    balance = balance,
                    required = required,
                    "Autopay skipped: insufficient funds"
                );
                self.state
                    .notifier
                    .notify_user(
                        account_id,
                        "Not enough balance to renew your subscription - please top up",
                    )
                    .await;
                false
            }
            Err(e) => {
                tracing::error!(account_id = %account_id, error = %e, "Autopay renewal failed");
                false
            }
        }
    }

    /// Expire an overdue subscription and disable its backend user.
    async fn expire(&self, subscription: &Subscription, now: DateTime<Utc>) {
        let account_id = subscription.account_id;

        match self.state.store.resolve_expiry(&account_id, now) {
            Ok(Some(outcome)) if outcome.transitioned => {
                tracing::info!(account_id = %account_id, "Subscription expired by sweep");
                subscriptions::push_disable(&self.state, &outcome.subscription).await;
                self.state
                    .notifier
                    .notify_user(account_id, "Your subscription has expired")
                    .await;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(account_id = %account_id, error = %e, "Expiry resolution failed");
            }
        }
    }
}
