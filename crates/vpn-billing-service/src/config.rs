//! Service configuration.

use vpn_billing_core::{PricingConfig, ServerGroupId};
use vpn_billing_store::TrialParams;

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/vpn-billing").
    pub data_dir: String,

    /// Service API key for service-to-service auth (bot front-end).
    pub service_api_key: Option<String>,

    /// Admin API key for administrative operations.
    pub admin_api_key: Option<String>,

    /// Shared secret for payment gateway webhook signatures.
    pub payment_webhook_secret: Option<String>,

    /// Provisioning backend API URL (optional).
    pub provisioning_api_url: Option<String>,

    /// Provisioning backend API key (optional).
    pub provisioning_api_key: Option<String>,

    /// Trial subscription defaults.
    pub trial: TrialConfig,

    /// Referral program settings.
    pub referral: ReferralConfig,

    /// Autopay sweep settings.
    pub autopay: AutopayConfig,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// Pricing configuration.
    pub pricing: PricingConfig,
}

/// Trial subscription defaults.
#[derive(Debug, Clone)]
pub struct TrialConfig {
    /// Trial duration in days.
    pub duration_days: u32,

    /// Trial traffic allowance in GB (0 = unlimited).
    pub traffic_limit_gb: u32,

    /// Trial device allowance.
    pub device_limit: u32,

    /// Server group granted to trial subscriptions, if any.
    pub server_group: Option<ServerGroupId>,
}

/// Referral program settings.
#[derive(Debug, Clone)]
pub struct ReferralConfig {
    /// Minimum topup in kopeks that counts as a qualifying first topup.
    pub minimum_topup_kopeks: i64,

    /// Bonus in kopeks paid to the referred account on its first topup.
    pub referred_bonus_kopeks: i64,

    /// Bonus in kopeks paid to the inviter on the referred account's first topup.
    pub inviter_bonus_kopeks: i64,

    /// Commission on the qualifying topup amount, in whole percent.
    pub commission_percent: i64,
}

/// Autopay sweep settings.
#[derive(Debug, Clone)]
pub struct AutopayConfig {
    /// Default lead time in days carried onto new subscriptions.
    pub default_days_before: u32,

    /// Period in days that autopay renewals are charged for.
    pub renewal_period_days: u32,

    /// How often the sweep runs, in seconds.
    pub sweep_interval_seconds: u64,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/vpn-billing".into()),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok(),
            payment_webhook_secret: std::env::var("PAYMENT_WEBHOOK_SECRET").ok(),
            provisioning_api_url: std::env::var("PROVISIONING_API_URL").ok(),
            provisioning_api_key: std::env::var("PROVISIONING_API_KEY").ok(),
            trial: TrialConfig {
                duration_days: env_parse("TRIAL_DURATION_DAYS", vpn_billing_core::TRIAL_DURATION_DAYS),
                traffic_limit_gb: env_parse(
                    "TRIAL_TRAFFIC_LIMIT_GB",
                    vpn_billing_core::TRIAL_TRAFFIC_LIMIT_GB,
                ),
                device_limit: env_parse("TRIAL_DEVICE_LIMIT", vpn_billing_core::TRIAL_DEVICE_LIMIT),
                server_group: std::env::var("TRIAL_SERVER_GROUP")
                    .ok()
                    .and_then(|s| s.parse().ok()),
            },
            referral: ReferralConfig {
                minimum_topup_kopeks: env_parse("REFERRAL_MINIMUM_TOPUP_KOPEKS", 10_000),
                referred_bonus_kopeks: env_parse("REFERRAL_REFERRED_BONUS_KOPEKS", 10_000),
                inviter_bonus_kopeks: env_parse("REFERRAL_INVITER_BONUS_KOPEKS", 10_000),
                commission_percent: env_parse("REFERRAL_COMMISSION_PERCENT", 25),
            },
            autopay: AutopayConfig {
                default_days_before: env_parse("AUTOPAY_DAYS_BEFORE", 3),
                renewal_period_days: env_parse("AUTOPAY_RENEWAL_PERIOD_DAYS", 30),
                sweep_interval_seconds: env_parse("AUTOPAY_SWEEP_INTERVAL_SECONDS", 60),
            },
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES", 1024 * 1024), // 1MB
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS", 30),
            pricing: PricingConfig::default(),
        }
    }

    /// Trial parameters for the store, built from the trial defaults.
    #[must_use]
    pub fn trial_params(&self) -> TrialParams {
        TrialParams {
            duration_days: self.trial.duration_days,
            traffic_limit_gb: self.trial.traffic_limit_gb,
            device_limit: self.trial.device_limit,
            group: self.trial.server_group,
            autopay_days_before: self.autopay.default_days_before,
        }
    }
}

/// Parse an environment variable, falling back to a default.
fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/vpn-billing".into(),
            service_api_key: None,
            admin_api_key: None,
            payment_webhook_secret: None,
            provisioning_api_url: None,
            provisioning_api_key: None,
            trial: TrialConfig {
                duration_days: vpn_billing_core::TRIAL_DURATION_DAYS,
                traffic_limit_gb: vpn_billing_core::TRIAL_TRAFFIC_LIMIT_GB,
                device_limit: vpn_billing_core::TRIAL_DEVICE_LIMIT,
                server_group: None,
            },
            referral: ReferralConfig {
                minimum_topup_kopeks: 10_000,
                referred_bonus_kopeks: 10_000,
                inviter_bonus_kopeks: 10_000,
                commission_percent: 25,
            },
            autopay: AutopayConfig {
                default_days_before: 3,
                renewal_period_days: 30,
                sweep_interval_seconds: 60,
            },
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            pricing: PricingConfig::default(),
        }
    }
}
