//! Balance and transaction integration tests.

mod common;

use common::TestHarness;
use axum::http::StatusCode;
use serde_json::json;

// ============================================================================
// Topup and charge
// ============================================================================

#[tokio::test]
async fn topup_then_charge() {
    let harness = TestHarness::new();
    let account_id = harness.create_account().await;

    let body = harness.top_up(&account_id, 100_000).await;
    assert_eq!(body["new_balance_kopeks"], 100_000);
    assert_eq!(body["duplicate"], false);

    let response = harness
        .server
        .post("/v1/balance/charge")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "account_id": account_id,
            "amount_kopeks": 30_000,
            "description": "Manual charge"
        }))
        .await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["new_balance_kopeks"], 70_000);

    assert_eq!(harness.balance_of(&account_id).await, 70_000);
}

#[tokio::test]
async fn charge_insufficient_funds_mutates_nothing() {
    let harness = TestHarness::new();
    let account_id = harness.create_account().await;

    let response = harness
        .server
        .post("/v1/balance/charge")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "account_id": account_id,
            "amount_kopeks": 50_000
        }))
        .await;

    response.assert_status(StatusCode::PAYMENT_REQUIRED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"]["code"], "insufficient_funds");
    assert_eq!(body["error"]["details"]["balance_kopeks"], 0);
    assert_eq!(body["error"]["details"]["required_kopeks"], 50_000);

    // No transaction was written
    let response = harness
        .server
        .get(&format!("/v1/balance/transactions?account_id={account_id}"))
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert!(body["transactions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn topup_is_idempotent_on_external_id() {
    let harness = TestHarness::new();
    let account_id = harness.create_account().await;

    let request = json!({
        "account_id": account_id,
        "amount_kopeks": 50_000,
        "external_id": "pay-123"
    });

    let first = harness
        .server
        .post("/v1/balance/topup")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&request)
        .await;
    first.assert_status_ok();
    let first: serde_json::Value = first.json();
    assert_eq!(first["duplicate"], false);

    let second = harness
        .server
        .post("/v1/balance/topup")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&request)
        .await;
    second.assert_status_ok();
    let second: serde_json::Value = second.json();
    assert_eq!(second["duplicate"], true);
    assert_eq!(second["transaction_id"], first["transaction_id"]);

    assert_eq!(harness.balance_of(&account_id).await, 50_000);
}

#[tokio::test]
async fn topup_rejects_non_positive_amount() {
    let harness = TestHarness::new();
    let account_id = harness.create_account().await;

    let response = harness
        .server
        .post("/v1/balance/topup")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "account_id": account_id,
            "amount_kopeks": 0
        }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn balance_routes_require_service_key() {
    let harness = TestHarness::new();
    let account_id = harness.create_account().await;

    let response = harness
        .server
        .post("/v1/balance/topup")
        .json(&json!({
            "account_id": account_id,
            "amount_kopeks": 1000
        }))
        .await;
    response.assert_status_unauthorized();

    let response = harness
        .server
        .post("/v1/balance/topup")
        .add_header("x-api-key", "wrong-key")
        .json(&json!({
            "account_id": account_id,
            "amount_kopeks": 1000
        }))
        .await;
    response.assert_status_unauthorized();
}

// ============================================================================
// Transaction history
// ============================================================================

#[tokio::test]
async fn transactions_newest_first_with_pagination() {
    let harness = TestHarness::new();
    let account_id = harness.create_account().await;

    harness.top_up(&account_id, 1_000).await;
    harness.top_up(&account_id, 2_000).await;
    harness.top_up(&account_id, 3_000).await;

    let response = harness
        .server
        .get(&format!("/v1/balance/transactions?account_id={account_id}"))
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 3);
    assert_eq!(transactions[0]["amount_kopeks"], 3_000);
    assert_eq!(transactions[2]["amount_kopeks"], 1_000);
    assert_eq!(body["has_more"], false);

    let response = harness
        .server
        .get(&format!(
            "/v1/balance/transactions?account_id={account_id}&limit=2"
        ))
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["transactions"].as_array().unwrap().len(), 2);
    assert_eq!(body["has_more"], true);
}

#[tokio::test]
async fn transactions_for_unknown_account_fail() {
    let harness = TestHarness::new();

    let response = harness
        .server
        .get("/v1/balance/transactions?account_id=00000000-0000-0000-0000-000000000000")
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;

    response.assert_status_not_found();
}

// ============================================================================
// Admin balance adjustment
// ============================================================================

#[tokio::test]
async fn admin_adjustment_credits_and_debits() {
    let harness = TestHarness::new();
    let account_id = harness.create_account().await;

    let response = harness
        .server
        .post("/v1/admin/balance/adjust")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&json!({
            "account_id": account_id,
            "amount_kopeks": 5_000,
            "description": "Goodwill credit"
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["new_balance_kopeks"], 5_000);

    let response = harness
        .server
        .post("/v1/admin/balance/adjust")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&json!({
            "account_id": account_id,
            "amount_kopeks": -2_000,
            "description": "Correction"
        }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["new_balance_kopeks"], 3_000);
}

#[tokio::test]
async fn admin_adjustment_rejects_unnegatable_debit() {
    let harness = TestHarness::new();
    let account_id = harness.create_account().await;

    let response = harness
        .server
        .post("/v1/admin/balance/adjust")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&json!({
            "account_id": account_id,
            "amount_kopeks": i64::MIN,
            "description": "Overflow attempt"
        }))
        .await;

    response.assert_status_bad_request();
    assert_eq!(harness.balance_of(&account_id).await, 0);
}

#[tokio::test]
async fn admin_adjustment_does_not_count_as_first_topup() {
    let harness = TestHarness::new();
    let account_id = harness.create_account().await;

    harness
        .server
        .post("/v1/admin/balance/adjust")
        .add_header("x-admin-key", harness.admin_api_key.clone())
        .json(&json!({
            "account_id": account_id,
            "amount_kopeks": 50_000,
            "description": "Goodwill credit"
        }))
        .await
        .assert_status_ok();

    let response = harness
        .server
        .get(&format!("/v1/accounts/{account_id}"))
        .add_header("x-api-key", harness.service_api_key.clone())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["has_made_first_topup"], false);
}

#[tokio::test]
async fn admin_routes_reject_service_key() {
    let harness = TestHarness::new();
    let account_id = harness.create_account().await;

    let response = harness
        .server
        .post("/v1/admin/balance/adjust")
        .add_header("x-api-key", harness.service_api_key.clone())
        .json(&json!({
            "account_id": account_id,
            "amount_kopeks": 5_000,
            "description": "Nope"
        }))
        .await;

    response.assert_status_unauthorized();
}
