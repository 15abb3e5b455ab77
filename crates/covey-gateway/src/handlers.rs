// SPDX-FileCopyrightText: 2026 Covey Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Built-in request handlers and the storage-error-to-status mapping.

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use covey_core::{CoveyError, HealthStatus};

use crate::server::GatewayState;

/// Unauthenticated health probe backed by the storage handle.
///
/// Container orchestrators poll this to decide worker liveness.
pub async fn get_healthz(State(state): State<GatewayState>) -> impl IntoResponse {
    let uptime_secs = state.started_at.elapsed().as_secs();
    match state.handle.health_check().await {
        HealthStatus::Healthy => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "uptime_secs": uptime_secs })),
        ),
        HealthStatus::Degraded(detail) => (
            StatusCode::OK,
            Json(json!({ "status": "degraded", "detail": detail, "uptime_secs": uptime_secs })),
        ),
        HealthStatus::Unhealthy(detail) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "status": "unhealthy", "detail": detail })),
        ),
    }
}

/// Map a storage error to the status code a request handler should return.
///
/// A write timeout is retryable by the client; a conflict that survived
/// the storage layer's own retries likewise. Everything else is a plain
/// server-side failure.
pub fn error_status(err: &CoveyError) -> StatusCode {
    match err {
        CoveyError::WriteTimeout { .. } => StatusCode::SERVICE_UNAVAILABLE,
        CoveyError::Conflict { .. } => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
