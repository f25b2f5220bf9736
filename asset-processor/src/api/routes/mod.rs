//! API route modules.

pub mod admin;
pub mod health;
pub mod process;
pub mod progress;
pub mod queue;

use axum::Router;

use crate::api::server::AppState;

/// Method and path of every route, for the startup log.
pub const ROUTES: &[(&str, &str)] = &[
    ("GET", "/"),
    ("GET", "/health"),
    ("GET", "/process/{type}/{id}"),
    ("GET", "/progress/{id}"),
    ("GET", "/queue"),
    ("POST", "/admin/restart"),
];

/// Create the main API router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::router())
        .merge(process::router())
        .merge(progress::router())
        .merge(queue::router())
        .nest("/admin", admin::router())
        .with_state(state)
}
