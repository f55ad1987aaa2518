//! Common test utilities for vpn-billing integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use serde_json::json;
use tempfile::TempDir;

use vpn_billing_service::crypto::hmac_sha256_hex;
use vpn_billing_service::{create_router, AppState, ServiceConfig};
use vpn_billing_store::RocksStore;

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Temporary directory for the database (kept alive for test duration).
    pub _temp_dir: TempDir,
    /// The service API key for bot-to-service requests.
    pub service_api_key: String,
    /// The admin API key for administrative requests.
    pub admin_api_key: String,
    /// The shared secret for payment webhook signatures.
    pub webhook_secret: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh database.
    pub fn new() -> Self {
        Self::with_config(|_| {})
    }

    /// Create a harness after tweaking the default test configuration.
    pub fn with_config(tweak: impl FnOnce(&mut ServiceConfig)) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store = RocksStore::open(temp_dir.path()).expect("Failed to open store");

        let service_api_key = "test-service-key".to_string();
        let admin_api_key = "test-admin-key".to_string();
        let webhook_secret = "test-webhook-secret".to_string();

        let mut config = ServiceConfig {
            listen_addr: "127.0.0.1:0".into(),
            data_dir: temp_dir.path().to_string_lossy().to_string(),
            service_api_key: Some(service_api_key.clone()),
            admin_api_key: Some(admin_api_key.clone()),
            payment_webhook_secret: Some(webhook_secret.clone()),
            ..ServiceConfig::default()
        };
        tweak(&mut config);

        let state = AppState::new(Arc::new(store), config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            _temp_dir: temp_dir,
            service_api_key,
            admin_api_key,
            webhook_secret,
        }
    }

    /// Create an account through the admin API and return its ID.
    pub async fn create_account(&self) -> String {
        let response = self
            .server
            .post("/v1/admin/accounts")
            .add_header("x-admin-key", self.admin_api_key.clone())
            .json(&json!({}))
            .await;
        response.assert_status_ok();

        let body: serde_json::Value = response.json();
        body["id"].as_str().expect("account id").to_string()
    }

    /// Create an account referred by `inviter_id`.
    pub async fn create_referred_account(&self, inviter_id: &str) -> String {
        let response = self
            .server
            .post("/v1/admin/accounts")
            .add_header("x-admin-key", self.admin_api_key.clone())
            .json(&json!({ "referred_by": inviter_id }))
            .await;
        response.assert_status_ok();

        let body: serde_json::Value = response.json();
        body["id"].as_str().expect("account id").to_string()
    }

    /// Top up an account through the service API and return the response body.
    pub async fn top_up(&self, account_id: &str, amount_kopeks: i64) -> serde_json::Value {
        let response = self
            .server
            .post("/v1/balance/topup")
            .add_header("x-api-key", self.service_api_key.clone())
            .json(&json!({
                "account_id": account_id,
                "amount_kopeks": amount_kopeks
            }))
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Read an account's balance through the service API.
    pub async fn balance_of(&self, account_id: &str) -> i64 {
        let response = self
            .server
            .get(&format!("/v1/accounts/{account_id}"))
            .add_header("x-api-key", self.service_api_key.clone())
            .await;
        response.assert_status_ok();

        let body: serde_json::Value = response.json();
        body["balance_kopeks"].as_i64().expect("balance")
    }

    /// Grant a trial subscription through the admin API.
    pub async fn grant_trial(&self, account_id: &str) -> serde_json::Value {
        let response = self
            .server
            .post("/v1/admin/subscriptions/grant-trial")
            .add_header("x-admin-key", self.admin_api_key.clone())
            .json(&json!({ "account_id": account_id }))
            .await;
        response.assert_status_ok();
        response.json()
    }

    /// Sign a webhook body the way the payment gateway does.
    pub fn sign(&self, body: &str) -> String {
        hmac_sha256_hex(&self.webhook_secret, body)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
