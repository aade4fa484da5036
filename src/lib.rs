//! routewise - adaptive request routing core for LLM serving
//!
//! This library decides which backend model handles a task and how, caches
//! semantically similar answers, and runs the fixed request pipeline around
//! an external executor.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod context;
pub mod logging;
pub mod outcomes;
pub mod pipeline;
pub mod routing;

pub use context::CoreContext;

/// Current time as fractional unix seconds
pub(crate) fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}
