//! Liveness routes.

use axum::{Json, Router, extract::State, routing::get};

use crate::api::models::{HealthResponse, StatusResponse};
use crate::api::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
}

async fn root() -> Json<StatusResponse> {
    Json(StatusResponse::ok())
}

/// Health check endpoint with job counts per state.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        jobs: state.registry.stats(),
    })
}
