//! Process logging and per-run wide events.
//!
//! Telemetry records (spans, metrics, events) flow through
//! [`TelemetryEmitter`](crate::telemetry::TelemetryEmitter). This module
//! covers the operator side: the `tracing` subscriber and the single wide
//! summary each run leaves behind.

mod logging;
mod summary;

pub use logging::{init_logging, LogFormat};
pub use summary::RunSummary;
