//! Progress sources.
//!
//! Two strategies write the same `progress` field of a [`JobEntry`]:
//! [`LogTailer`] polls the log of an external tool, [`StagedProgress`]
//! observes an in-process [`pipeline_common::StagedPipeline`].
//!
//! [`JobEntry`]: crate::jobs::JobEntry

mod log_tail;
mod patterns;
mod staged;

pub use log_tail::{
    DEFAULT_POLL_INTERVAL, LogTailer, MAX_POLL_INTERVAL, MIN_POLL_INTERVAL, TailerHandle,
    clamp_poll_interval,
};
pub use patterns::{LineSignal, LogProfile, ProgressPattern, normalize_progress, parse_quantity};
pub use staged::StagedProgress;

/// Round to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
