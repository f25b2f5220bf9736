//! asset-processor library crate.
//!
//! Converts uploaded 3D assets one job at a time and reports progress
//! over HTTP. The binary wires these modules together; integration tests
//! drive them directly.

pub mod api;
pub mod config;
pub mod error;
pub mod handlers;
pub mod ifc;
pub mod jobs;
pub mod logging;
pub mod panic_hook;
pub mod progress;
pub mod utils;

pub use error::{Error, Result};
