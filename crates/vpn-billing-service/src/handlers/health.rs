//! Liveness endpoint.

use axum::Json;
use serde::Serialize;

/// Health check response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `"ok"` when the process is serving requests.
    pub status: &'static str,
    /// Crate name and version, for deploy verification.
    pub service: &'static str,
    pub version: &'static str,
}

/// `GET /health` - process liveness probe, no auth.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}
