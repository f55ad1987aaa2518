//! Promo code types.
//!
//! A promo code grants a one-per-account effect: a balance bonus, extra
//! subscription days, or a trial subscription. Codes are matched
//! case-insensitively by normalizing to uppercase.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{AccountId, PromoCodeId};

/// Normalize a user-entered promo code for lookup.
#[must_use]
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// A promo code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoCode {
    /// The promo code ID.
    pub id: PromoCodeId,

    /// Normalized (uppercase) code string, unique across all codes.
    pub code: String,

    /// What redeeming the code grants.
    pub kind: PromoCodeKind,

    /// Maximum number of redemptions across all accounts.
    pub max_uses: u32,

    /// Redemptions so far. Monotonic, never exceeds `max_uses`.
    pub current_uses: u32,

    /// Start of the validity window, if bounded.
    pub valid_from: Option<DateTime<Utc>>,

    /// End of the validity window, if bounded.
    pub valid_until: Option<DateTime<Utc>>,

    /// Administrative kill switch.
    pub is_active: bool,

    /// When the code was created.
    pub created_at: DateTime<Utc>,

    /// When the code was last updated.
    pub updated_at: DateTime<Utc>,
}

impl PromoCode {
    /// Create a new active promo code. The code string is normalized.
    #[must_use]
    pub fn new(
        code: &str,
        kind: PromoCodeKind,
        max_uses: u32,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PromoCodeId::generate(),
            code: normalize_code(code),
            kind,
            max_uses,
            current_uses: 0,
            valid_from,
            valid_until,
            is_active: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the code is active and inside its validity window at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        if self.valid_from.is_some_and(|from| now < from) {
            return false;
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return false;
        }
        true
    }

    /// Whether all redemptions have been consumed.
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.current_uses >= self.max_uses
    }
}

/// The effect granted by redeeming a promo code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PromoCodeKind {
    /// Credit the balance by a fixed amount.
    Balance {
        /// Bonus amount in kopeks.
        bonus_kopeks: i64,
    },

    /// Extend the existing subscription.
    SubscriptionDays {
        /// Days added to the subscription.
        days: u32,
    },

    /// Grant a trial subscription. Fails if the account already has one.
    TrialSubscription,
}

/// Record of one account redeeming one code. Unique per (code, account).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoCodeUse {
    /// The redeemed code.
    pub promocode_id: PromoCodeId,

    /// The redeeming account.
    pub account_id: AccountId,

    /// When the redemption happened.
    pub used_at: DateTime<Utc>,
}
