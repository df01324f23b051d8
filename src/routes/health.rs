// src/routes/health.rs
//! Health check endpoint for the alert worker.
//!
//! This module defines the `/health` route used by container orchestrators
//! and CI pipelines to verify that the worker is running. It is a sibling
//! module in the `routes` directory:
//! - Internal to this file: endpoint handler(s) and related types
//! - Exports to the gateway (`mod.rs`): a subrouter containing the `/health` route

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use super::AppState;

/// JSON response body for the `/health` endpoint.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    duration_requirement: i64,
}

/// Handle `GET /health`.
///
/// Reports the sustained-breach requirement in seconds. Does not touch the
/// database.
async fn health(State((_, manager)): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        duration_requirement: manager.duration_required().num_seconds(),
    })
}

/// Create a subrouter containing the `/health` route.
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
