//! Subscription state.
//!
//! Each account has at most one subscription. The stored status is only
//! corrected in one place (the store's expiry resolution); everything else
//! reads the stored status after that correction has run. There is
//! deliberately no lazily-computed "actual status" anywhere.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, ServerGroupId};

/// Traffic limit value meaning "unlimited".
pub const UNLIMITED_TRAFFIC_GB: u32 = 0;

/// A VPN subscription, keyed 1:1 by account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    /// The owning account.
    pub account_id: AccountId,

    /// Current status. Only moves through the documented transitions.
    pub status: SubscriptionStatus,

    /// Whether this subscription started as a trial and has not been paid yet.
    pub is_trial: bool,

    /// When the subscription started.
    pub start_date: DateTime<Utc>,

    /// When the subscription ends. Only ever moves forward.
    pub end_date: DateTime<Utc>,

    /// Traffic allowance in GB; `0` means unlimited.
    pub traffic_limit_gb: u32,

    /// Traffic used in GB, as last reported by the provisioning backend.
    /// A cache, not a source of truth.
    pub traffic_used_gb: f64,

    /// Number of devices allowed to connect.
    pub device_limit: u32,

    /// Server groups the subscription grants access to.
    pub connected_groups: Vec<ServerGroupId>,

    /// Whether the renewal sweep should auto-charge this subscription.
    pub autopay_enabled: bool,

    /// How many days before `end_date` the autopay charge fires.
    pub autopay_days_before: u32,

    /// Identifier of the user object in the provisioning backend, once created.
    pub provisioning_handle: Option<String>,

    /// When the subscription was created.
    pub created_at: DateTime<Utc>,

    /// When the subscription was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Create a trial subscription starting now.
    #[must_use]
    pub fn trial(
        account_id: AccountId,
        duration_days: u32,
        traffic_limit_gb: u32,
        device_limit: u32,
        group: Option<ServerGroupId>,
        autopay_days_before: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            status: SubscriptionStatus::Trial,
            is_trial: true,
            start_date: now,
            end_date: now + Duration::days(i64::from(duration_days)),
            traffic_limit_gb,
            traffic_used_gb: 0.0,
            device_limit,
            connected_groups: group.into_iter().collect(),
            autopay_enabled: false,
            autopay_days_before,
            provisioning_handle: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a paid subscription starting now.
    #[must_use]
    pub fn paid(
        account_id: AccountId,
        duration_days: u32,
        traffic_limit_gb: u32,
        device_limit: u32,
        groups: Vec<ServerGroupId>,
        autopay_days_before: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            account_id,
            status: SubscriptionStatus::Active,
            is_trial: false,
            start_date: now,
            end_date: now + Duration::days(i64::from(duration_days)),
            traffic_limit_gb,
            traffic_used_gb: 0.0,
            device_limit,
            connected_groups: groups,
            autopay_enabled: false,
            autopay_days_before,
            provisioning_handle: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Extend the subscription by `days`.
    ///
    /// The new end date is counted from the current end date if it is still in
    /// the future, otherwise from `now`, so expired time is never credited
    /// back. An expired subscription becomes active again; a trial that is
    /// extended by a paid purchase becomes a regular active subscription.
    pub fn extend(&mut self, now: DateTime<Utc>, days: u32) {
        let base = if self.end_date > now { self.end_date } else { now };
        self.end_date = base + Duration::days(i64::from(days));

        if self.status == SubscriptionStatus::Expired {
            self.status = SubscriptionStatus::Active;
        }
        self.updated_at = now;
    }

    /// Convert a trial into a paid subscription after a purchase.
    pub fn mark_paid(&mut self) {
        self.is_trial = false;
        if self.status == SubscriptionStatus::Trial {
            self.status = SubscriptionStatus::Active;
        }
    }

    /// Whether the stored status needs the expiry correction at `now`.
    #[must_use]
    pub fn is_expiry_due(&self, now: DateTime<Utc>) -> bool {
        matches!(
            self.status,
            SubscriptionStatus::Trial | SubscriptionStatus::Active
        ) && self.end_date <= now
    }

    /// Apply the expiry correction. Returns `true` if the status changed.
    ///
    /// This is the only status transition driven by the clock; callers must
    /// persist the result before acting on it.
    pub fn resolve_expiry(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_expiry_due(now) {
            self.status = SubscriptionStatus::Expired;
            self.updated_at = now;
            true
        } else {
            false
        }
    }

    /// Whether the autopay sweep should consider this subscription at `now`.
    ///
    /// An already-expired subscription still qualifies: topping up after the
    /// balance ran dry lets the next sweep renew and reactivate it. Only an
    /// administrative disable opts a subscription out.
    #[must_use]
    pub fn is_autopay_due(&self, now: DateTime<Utc>) -> bool {
        if !self.autopay_enabled {
            return false;
        }
        if self.status == SubscriptionStatus::Disabled {
            return false;
        }
        self.end_date <= now + Duration::days(i64::from(self.autopay_days_before))
    }

    /// Whether traffic is unlimited.
    #[must_use]
    pub fn is_unlimited_traffic(&self) -> bool {
        self.traffic_limit_gb == UNLIMITED_TRAFFIC_GB
    }

    /// Build the read-model for this subscription at `now`.
    #[must_use]
    pub fn view_at(&self, now: DateTime<Utc>) -> SubscriptionView {
        let days_left = (self.end_date - now).num_days().max(0);
        SubscriptionView {
            account_id: self.account_id,
            status: self.status,
            is_trial: self.is_trial,
            end_date: self.end_date,
            days_left,
            traffic_limit_gb: self.traffic_limit_gb,
            traffic_used_gb: self.traffic_used_gb,
            device_limit: self.device_limit,
            connected_groups: self.connected_groups.clone(),
            autopay_enabled: self.autopay_enabled,
            autopay_days_before: self.autopay_days_before,
        }
    }
}

/// Status of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Free trial period.
    Trial,

    /// Paid and current.
    Active,

    /// End date passed without renewal.
    Expired,

    /// Administratively disabled; the clock does not touch this state.
    Disabled,
}

/// Point-in-time read model of a subscription.
///
/// Produced by `Subscription::view_at` after the stored status has been
/// corrected for expiry; never cached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionView {
    /// The owning account.
    pub account_id: AccountId,
    /// Status after expiry resolution.
    pub status: SubscriptionStatus,
    /// Whether this is still an unpaid trial.
    pub is_trial: bool,
    /// When the subscription ends.
    pub end_date: DateTime<Utc>,
    /// Whole days remaining, never negative.
    pub days_left: i64,
    /// Traffic allowance in GB; `0` means unlimited.
    pub traffic_limit_gb: u32,
    /// Traffic used in GB.
    pub traffic_used_gb: f64,
    /// Device limit.
    pub device_limit: u32,
    /// Granted server groups.
    pub connected_groups: Vec<ServerGroupId>,
    /// Whether autopay is on.
    pub autopay_enabled: bool,
    /// Autopay lead time in days.
    pub autopay_days_before: u32,
}
