//! Health and version endpoints.

use axum::{Json, response::IntoResponse};
use serde::Serialize;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
}

#[derive(Serialize)]
struct VersionResponse {
    version: &'static str,
    name: &'static str,
}

/// GET /api/health
pub async fn health_check() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// GET /api/version
pub async fn version() -> impl IntoResponse {
    Json(VersionResponse {
        version: prdispatch_core::VERSION,
        name: "prdispatchd",
    })
}
