//! Payment gateway webhook handler.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use vpn_billing_core::AccountId;

use crate::crypto::{constant_time_eq, hmac_sha256_hex};
use crate::error::ApiError;
use crate::ledger;
use crate::state::AppState;

/// Payment webhook payload.
#[derive(Debug, Deserialize)]
pub struct PaymentWebhookPayload {
    /// The gateway's payment ID; doubles as the ledger idempotency key.
    pub external_id: String,
    /// The account that paid.
    pub account_id: AccountId,
    /// Paid amount in kopeks.
    pub amount_kopeks: i64,
    /// Payment status as reported by the gateway.
    pub status: String,
}

/// Payment webhook response.
#[derive(Debug, Serialize)]
pub struct PaymentWebhookResponse {
    /// Whether the payment was credited.
    pub processed: bool,
    /// The ledger transaction ID, when credited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// Whether this delivery repeated an already-processed payment.
    pub duplicate: bool,
}

/// Handle a payment notification from the gateway.
///
/// The raw body is verified against the `x-signature` HMAC before parsing.
/// Redelivered notifications are absorbed by the ledger's idempotency key,
/// so the gateway can retry as often as it likes.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<PaymentWebhookResponse>, ApiError> {
    let secret = state
        .config
        .payment_webhook_secret
        .as_ref()
        .ok_or(ApiError::Unauthorized)?;

    let signature = headers
        .get("x-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let expected = hmac_sha256_hex(secret, &body);
    if !constant_time_eq(signature, &expected) {
        tracing::warn!("Payment webhook rejected: bad signature");
        return Err(ApiError::Unauthorized);
    }

    let payload: PaymentWebhookPayload = serde_json::from_str(&body)
        .map_err(|e| ApiError::BadRequest(format!("Invalid webhook payload: {e}")))?;

    if payload.status != "succeeded" {
        tracing::info!(
            external_id = %payload.external_id,
            status = %payload.status,
            "Payment webhook ignored: not a success"
        );
        return Ok(Json(PaymentWebhookResponse {
            processed: false,
            transaction_id: None,
            duplicate: false,
        }));
    }

    let outcome = ledger::top_up(
        &state,
        payload.account_id,
        payload.amount_kopeks,
        format!("Payment {}", payload.external_id),
        Some(payload.external_id),
    )
    .await?;

    Ok(Json(PaymentWebhookResponse {
        processed: true,
        transaction_id: Some(outcome.transaction.id.to_string()),
        duplicate: outcome.duplicate,
    }))
}
