//! Operator routes.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
};
use tracing::warn;

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::RestartResponse;
use crate::api::server::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Exit status used for operator restarts.
pub const RESTART_EXIT_CODE: i32 = 1;

/// Gives the 202 response time to flush before the process exits.
const RESTART_DELAY: Duration = Duration::from_millis(100);

pub fn router() -> Router<AppState> {
    Router::new().route("/restart", post(restart))
}

/// Exit the process so the supervisor restarts it. In-flight jobs are lost.
async fn restart(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<(StatusCode, Json<RestartResponse>)> {
    let Some(expected) = state.admin_token.as_deref() else {
        return Err(ApiError::not_found("Restart endpoint is disabled"));
    };

    let provided = headers
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    if provided != Some(expected) {
        warn!("Rejected restart request with missing or wrong admin token");
        return Err(ApiError::unauthorized("Invalid admin token"));
    }

    let stats = state.registry.stats();
    warn!(
        processing = stats.processing,
        queued = stats.queued,
        "Restart requested, exiting"
    );

    let hook = Arc::clone(&state.restart);
    tokio::spawn(async move {
        tokio::time::sleep(RESTART_DELAY).await;
        hook(RESTART_EXIT_CODE);
    });

    Ok((StatusCode::ACCEPTED, Json(RestartResponse::scheduled())))
}
