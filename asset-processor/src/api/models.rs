//! API response models.
//!
//! Progress and queue responses reuse [`ProgressReport`] and [`JobSnapshot`]
//! from the job module directly.
//!
//! [`ProgressReport`]: crate::jobs::ProgressReport
//! [`JobSnapshot`]: crate::jobs::JobSnapshot

use serde::Serialize;

use crate::jobs::JobStats;

// ============================================================================
// Generic DTOs
// ============================================================================

/// `{"status":"OK"}`
#[derive(Debug, Clone, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

impl StatusResponse {
    pub fn ok() -> Self {
        Self { status: "OK" }
    }
}

// ============================================================================
// Job DTOs
// ============================================================================

/// Answer to a process request.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessResponse {
    pub status: &'static str,
    pub message: &'static str,
    pub id: String,
}

impl ProcessResponse {
    pub fn queued(id: impl Into<String>) -> Self {
        Self {
            status: "OK",
            message: "Queued",
            id: id.into(),
        }
    }
}

// ============================================================================
// Health DTOs
// ============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: String,
    pub uptime_secs: u64,
    pub jobs: JobStats,
}

// ============================================================================
// Admin DTOs
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct RestartResponse {
    pub status: &'static str,
    pub message: &'static str,
}

impl RestartResponse {
    pub fn scheduled() -> Self {
        Self {
            status: "OK",
            message: "Restarting",
        }
    }
}
