//! Job submission.

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use crate::api::error::{ApiError, ApiResult};
use crate::api::models::ProcessResponse;
use crate::api::server::AppState;
use crate::error::Error;
use crate::jobs::JobKind;

pub fn router() -> Router<AppState> {
    Router::new().route("/process/{type}/{id}", get(process_job))
}

/// Register a job for `<base>/<type>/<id>/` and try to start it.
///
/// Unknown types are a bad request; malformed ids are a validation error.
async fn process_job(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> ApiResult<Json<ProcessResponse>> {
    let kind: JobKind = kind.parse().map_err(|e| match e {
        Error::Validation(msg) => ApiError::bad_request(msg),
        other => ApiError::from(other),
    })?;

    let entry = state.registry.register(&id, kind).await?;
    Ok(Json(ProcessResponse::queued(entry.id())))
}
