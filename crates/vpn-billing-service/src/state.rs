//! Application state.

use std::sync::Arc;

use vpn_billing_store::RocksStore;

use crate::config::ServiceConfig;
use crate::notify::{LogNotifier, NotificationSink};
use crate::provisioning::{HttpProvisioningClient, ProvisioningClient};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<RocksStore>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Provisioning backend client (optional).
    pub provisioning: Option<Arc<dyn ProvisioningClient>>,

    /// Notification sink.
    pub notifier: Arc<dyn NotificationSink>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// Builds the HTTP provisioning client when configured and falls back to
    /// the logging notification sink.
    #[must_use]
    pub fn new(store: Arc<RocksStore>, config: ServiceConfig) -> Self {
        let provisioning: Option<Arc<dyn ProvisioningClient>> = config
            .provisioning_api_url
            .as_ref()
            .zip(config.provisioning_api_key.as_ref())
            .map(|(url, key)| {
                tracing::info!(provisioning_url = %url, "Provisioning integration enabled");
                Arc::new(HttpProvisioningClient::new(url, key)) as Arc<dyn ProvisioningClient>
            });

        if provisioning.is_none() {
            tracing::warn!("Provisioning not configured - quota changes stay local");
        }

        Self {
            store,
            config,
            provisioning,
            notifier: Arc::new(LogNotifier),
        }
    }

    /// Replace the provisioning client and notification sink.
    ///
    /// Used by tests and by deployments that deliver notifications through a
    /// real messenger integration.
    #[must_use]
    pub fn with_sinks(
        mut self,
        provisioning: Option<Arc<dyn ProvisioningClient>>,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        self.provisioning = provisioning;
        self.notifier = notifier;
        self
    }
}
