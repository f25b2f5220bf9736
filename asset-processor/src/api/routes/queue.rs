use axum::{Json, Router, extract::State, routing::get};

use crate::api::server::AppState;
use crate::jobs::JobSnapshot;

pub fn router() -> Router<AppState> {
    Router::new().route("/queue", get(list_queue))
}

/// Jobs waiting or running, oldest first.
async fn list_queue(State(state): State<AppState>) -> Json<Vec<JobSnapshot>> {
    Json(state.registry.queue())
}
