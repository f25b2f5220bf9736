//! HTTP API.
//!
//! Thin axum layer over the [`JobRegistry`](crate::jobs::JobRegistry).

pub mod error;
pub mod models;
pub mod routes;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{ApiServer, ApiServerConfig, AppState};
