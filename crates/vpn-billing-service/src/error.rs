//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use vpn_billing_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists or invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Insufficient balance for the requested charge.
    #[error("insufficient funds: balance={balance}, required={required}")]
    InsufficientFunds {
        /// Current balance in kopeks.
        balance: i64,
        /// Required amount in kopeks.
        required: i64,
    },

    /// Promo code is inactive or outside its validity window.
    #[error("promo code expired: {0}")]
    PromoCodeExpired(String),

    /// Promo code has no redemptions left.
    #[error("promo code exhausted: {0}")]
    PromoCodeExhausted(String),

    /// The account already redeemed this promo code.
    #[error("promo code already used: {0}")]
    PromoCodeAlreadyUsed(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::InsufficientFunds { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_funds",
                self.to_string(),
                Some(serde_json::json!({
                    "balance_kopeks": balance,
                    "required_kopeks": required
                })),
            ),
            Self::PromoCodeExpired(code) => (
                StatusCode::GONE,
                "promo_code_expired",
                format!("Promo code {code} is expired or inactive"),
                None,
            ),
            Self::PromoCodeExhausted(code) => (
                StatusCode::CONFLICT,
                "promo_code_exhausted",
                format!("Promo code {code} has no redemptions left"),
                None,
            ),
            Self::PromoCodeAlreadyUsed(code) => (
                StatusCode::CONFLICT,
                "promo_code_already_used",
                format!("Promo code {code} was already redeemed by this account"),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => Self::NotFound(format!("{entity} not found: {id}")),
            StoreError::AccountAlreadyExists { account_id } => {
                Self::Conflict(format!("account already exists: {account_id}"))
            }
            StoreError::SubscriptionAlreadyExists { account_id } => {
                Self::Conflict(format!("subscription already exists for account: {account_id}"))
            }
            StoreError::SubscriptionNotFound { account_id } => {
                Self::NotFound(format!("no subscription for account: {account_id}"))
            }
            StoreError::InsufficientFunds { balance, required } => {
                Self::InsufficientFunds { balance, required }
            }
            StoreError::PromoCodeNotFound { code } => {
                Self::NotFound(format!("promo code not found: {code}"))
            }
            StoreError::PromoCodeExpired { code } => Self::PromoCodeExpired(code),
            StoreError::PromoCodeExhausted { code } => Self::PromoCodeExhausted(code),
            StoreError::PromoCodeAlreadyUsed { code } => Self::PromoCodeAlreadyUsed(code),
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}
