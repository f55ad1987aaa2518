//! Pricing configuration.
//!
//! All prices are integer kopeks. A renewal price is the sum of the period
//! base price, the traffic tier price, and the surcharge for devices beyond
//! the default allowance.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::subscription::UNLIMITED_TRAFFIC_GB;
use crate::Subscription;

// ============================================================================
// Constants
// ============================================================================

/// Device allowance included in the base price.
pub const DEFAULT_DEVICE_LIMIT: u32 = 1;

/// Hard cap on devices per subscription.
pub const MAX_DEVICE_LIMIT: u32 = 20;

/// Price per device beyond the default allowance, in kopeks (50 RUB).
pub const PRICE_PER_DEVICE_KOPEKS: i64 = 5_000;

/// Trial duration in days.
pub const TRIAL_DURATION_DAYS: u32 = 3;

/// Trial traffic allowance in GB.
pub const TRIAL_TRAFFIC_LIMIT_GB: u32 = 10;

/// Trial device allowance.
pub const TRIAL_DEVICE_LIMIT: u32 = 2;

/// Pricing configuration for subscriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Base price per subscription period, keyed by period length in days.
    pub period_prices: BTreeMap<u32, i64>,

    /// Traffic tier prices, keyed by tier size in GB. The `0` key is the
    /// unlimited tier.
    pub traffic_tiers: BTreeMap<u32, i64>,

    /// Price per device beyond [`DEFAULT_DEVICE_LIMIT`], in kopeks.
    pub price_per_device_kopeks: i64,
}

impl Default for PricingConfig {
    fn default() -> Self {
        let period_prices = BTreeMap::from([
            (14, 50_000),
            (30, 99_000),
            (60, 189_000),
            (90, 269_000),
            (180, 499_000),
            (360, 899_000),
        ]);

        let traffic_tiers = BTreeMap::from([
            (5, 2_000),
            (10, 3_500),
            (25, 7_000),
            (50, 11_000),
            (100, 15_000),
            (250, 17_000),
            (500, 19_000),
            (1000, 19_500),
            (UNLIMITED_TRAFFIC_GB, 20_000),
        ]);

        Self {
            period_prices,
            traffic_tiers,
            price_per_device_kopeks: PRICE_PER_DEVICE_KOPEKS,
        }
    }
}

impl PricingConfig {
    /// Base price for a subscription period, if that period is sold.
    #[must_use]
    pub fn period_price(&self, days: u32) -> Option<i64> {
        self.period_prices.get(&days).copied()
    }

    /// Price for a traffic allowance.
    ///
    /// The allowance is matched to the smallest tier that covers it; an
    /// allowance larger than every finite tier is priced as unlimited, as is
    /// the explicit unlimited value (`0`).
    #[must_use]
    pub fn traffic_price(&self, traffic_limit_gb: u32) -> i64 {
        let unlimited = self
            .traffic_tiers
            .get(&UNLIMITED_TRAFFIC_GB)
            .copied()
            .unwrap_or(0);

        if traffic_limit_gb == UNLIMITED_TRAFFIC_GB {
            return unlimited;
        }

        self.traffic_tiers
            .iter()
            .filter(|(tier, _)| **tier != UNLIMITED_TRAFFIC_GB)
            .find(|(tier, _)| **tier >= traffic_limit_gb)
            .map_or(unlimited, |(_, price)| *price)
    }

    /// Surcharge for a device limit above the default allowance.
    #[must_use]
    pub fn devices_price(&self, device_limit: u32) -> i64 {
        let extra = device_limit.saturating_sub(DEFAULT_DEVICE_LIMIT);
        i64::from(extra) * self.price_per_device_kopeks
    }

    /// Full renewal price for a subscription over a period.
    ///
    /// Returns `None` if the period is not sold.
    #[must_use]
    pub fn renewal_price(&self, subscription: &Subscription, period_days: u32) -> Option<i64> {
        let base = self.period_price(period_days)?;
        Some(
            base + self.traffic_price(subscription.traffic_limit_gb)
                + self.devices_price(subscription.device_limit),
        )
    }
}
