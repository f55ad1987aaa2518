//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `ServiceAuth` - service-to-service authentication via API key (the bot
//!   front-end acting on behalf of its users)
//! - `AdminAuth` - administrative operations via a separate API key
//!
//! Keys are compared in constant time.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

/// Pull a header value and compare it against a configured key.
///
/// Missing configuration rejects every request rather than letting the
/// endpoint run open.
fn check_key(parts: &Parts, header: &str, expected: Option<&String>) -> Result<(), ApiError> {
    let presented = parts
        .headers
        .get(header)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;

    let expected = expected.ok_or(ApiError::Unauthorized)?;

    if constant_time_eq(presented, expected) {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

/// Service authentication via the `x-api-key` header.
#[derive(Debug, Clone)]
pub struct ServiceAuth;

impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            check_key(parts, "x-api-key", state.config.service_api_key.as_ref())?;
            Ok(ServiceAuth)
        })
    }
}

/// Admin authentication via the `x-admin-key` header.
#[derive(Debug, Clone)]
pub struct AdminAuth;

impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    fn from_request_parts<'life0, 'life1, 'async_trait>(
        parts: &'life0 mut Parts,
        state: &'life1 Arc<AppState>,
    ) -> ::core::pin::Pin<
        Box<
            dyn ::core::future::Future<Output = Result<Self, Self::Rejection>>
                + ::core::marker::Send
                + 'async_trait,
        >,
    >
    where
        'life0: 'async_trait,
        'life1: 'async_trait,
        Self: 'async_trait,
    {
        Box::pin(async move {
            check_key(parts, "x-admin-key", state.config.admin_api_key.as_ref())?;
            Ok(AdminAuth)
        })
    }
}
