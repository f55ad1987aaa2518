//! Provisioning backend client.
//!
//! The billing core owns entitlements; the provisioning backend owns the
//! actual VPN users. After a local commit the service pushes the resulting
//! quota out here. Every call is best-effort: a remote failure is logged and
//! never rolls back the local state.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use vpn_billing_core::{AccountId, ServerGroupId, Subscription};

/// Error type for provisioning operations.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provisioning API returned an error.
    #[error("provisioning API error: {status} - {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },
}

/// The entitlement pushed to the provisioning backend.
#[derive(Debug, Clone, Serialize)]
pub struct Quota {
    /// When access ends.
    pub expire_at: DateTime<Utc>,

    /// Traffic allowance in bytes; `0` means unlimited.
    pub traffic_limit_bytes: u64,

    /// Number of devices allowed to connect.
    pub device_limit: u32,

    /// Server groups the user may connect through.
    pub server_groups: Vec<ServerGroupId>,
}

impl Quota {
    /// Build the quota a subscription entitles its account to.
    #[must_use]
    pub fn from_subscription(subscription: &Subscription) -> Self {
        Self {
            expire_at: subscription.end_date,
            traffic_limit_bytes: u64::from(subscription.traffic_limit_gb) * 1024 * 1024 * 1024,
            device_limit: subscription.device_limit,
            server_groups: subscription.connected_groups.clone(),
        }
    }
}

/// Client interface to the provisioning backend.
#[async_trait]
pub trait ProvisioningClient: Send + Sync {
    /// Create a user and return its backend handle.
    async fn create_user(
        &self,
        account_id: AccountId,
        quota: &Quota,
    ) -> Result<String, ProvisioningError>;

    /// Replace a user's quota.
    async fn update_user(&self, handle: &str, quota: &Quota) -> Result<(), ProvisioningError>;

    /// Disable a user's access.
    async fn disable_user(&self, handle: &str) -> Result<(), ProvisioningError>;

    /// Drop a user's registered devices so they can re-pair.
    async fn reset_devices(&self, handle: &str) -> Result<(), ProvisioningError>;
}

/// HTTP implementation of [`ProvisioningClient`].
#[derive(Debug, Clone)]
pub struct HttpProvisioningClient {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
struct CreateUserRequest<'a> {
    account_id: AccountId,
    #[serde(flatten)]
    quota: &'a Quota,
}

#[derive(Debug, Deserialize)]
struct CreateUserResponse {
    handle: String,
}

#[derive(Debug, Deserialize)]
struct ProvisioningErrorResponse {
    message: String,
}

impl HttpProvisioningClient {
    /// Create a new provisioning client.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be built (should not happen with
    /// default settings).
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ProvisioningError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let message = match response.json::<ProvisioningErrorResponse>().await {
            Ok(body) => body.message,
            Err(_) => format!("HTTP {status}"),
        };

        Err(ProvisioningError::Api {
            status: status.as_u16(),
            message,
        })
    }

    /// Like `handle_response` for endpoints with empty success bodies.
    async fn handle_empty_response(response: reqwest::Response) -> Result<(), ProvisioningError> {
        let status = response.status();

        if status.is_success() {
            return Ok(());
        }

        let message = match response.json::<ProvisioningErrorResponse>().await {
            Ok(body) => body.message,
            Err(_) => format!("HTTP {status}"),
        };

        Err(ProvisioningError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ProvisioningClient for HttpProvisioningClient {
    async fn create_user(
        &self,
        account_id: AccountId,
        quota: &Quota,
    ) -> Result<String, ProvisioningError> {
        let url = format!("{}/api/users", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&CreateUserRequest { account_id, quota })
            .send()
            .await?;

        Self::handle_response::<CreateUserResponse>(response)
            .await
            .map(|r| r.handle)
    }

    async fn update_user(&self, handle: &str, quota: &Quota) -> Result<(), ProvisioningError> {
        let url = format!("{}/api/users/{handle}", self.base_url);

        let response = self
            .client
            .patch(&url)
            .header("x-api-key", &self.api_key)
            .json(quota)
            .send()
            .await?;

        Self::handle_empty_response(response).await
    }

    async fn disable_user(&self, handle: &str) -> Result<(), ProvisioningError> {
        let url = format!("{}/api/users/{handle}/disable", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        Self::handle_empty_response(response).await
    }

    async fn reset_devices(&self, handle: &str) -> Result<(), ProvisioningError> {
        let url = format!("{}/api/users/{handle}/reset-devices", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .send()
            .await?;

        Self::handle_empty_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_quota() -> Quota {
        Quota {
            expire_at: Utc::now() + chrono::Duration::days(30),
            traffic_limit_bytes: 100 * 1024 * 1024 * 1024,
            device_limit: 2,
            server_groups: Vec::new(),
        }
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = HttpProvisioningClient::new("http://localhost:3000/", "test-key");
        assert_eq!(client.base_url, "http://localhost:3000");
    }

    #[tokio::test]
    async fn create_user_returns_handle() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/users"))
            .and(header("x-api-key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "handle": "vpn-user-42"
            })))
            .mount(&server)
            .await;

        let client = HttpProvisioningClient::new(server.uri(), "test-key");
        let handle = client
            .create_user(AccountId::generate(), &test_quota())
            .await
            .unwrap();
        assert_eq!(handle, "vpn-user-42");
    }

    #[tokio::test]
    async fn api_error_carries_status_and_message() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/api/users/u-1/disable"))
            .respond_with(ResponseTemplate::new(404).set_body_json(serde_json::json!({
                "message": "unknown user"
            })))
            .mount(&server)
            .await;

        let client = HttpProvisioningClient::new(server.uri(), "test-key");
        let err = client.disable_user("u-1").await.unwrap_err();

        match err {
            ProvisioningError::Api { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "unknown user");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn update_user_accepts_empty_body() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/api/users/u-1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = HttpProvisioningClient::new(server.uri(), "test-key");
        client.update_user("u-1", &test_quota()).await.unwrap();
    }
}
