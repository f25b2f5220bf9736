use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::api::error::ApiResult;
use crate::api::server::AppState;
use crate::jobs::ProgressReport;

pub fn router() -> Router<AppState> {
    Router::new().route("/progress/{id}", get(job_progress))
}

/// Polling a QUEUED job also retries its admission.
async fn job_progress(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProgressReport>> {
    Ok(Json(state.registry.progress(&id)?))
}
