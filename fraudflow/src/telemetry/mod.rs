//! Telemetry emission for pipeline runs.
//!
//! Every record carries the run's correlation id. Spans are tracked in a
//! [`SpanLedger`] so unbalanced span usage is visible at shutdown.
//!
//! - [`InMemoryTelemetry`] collects records for tests and audits
//! - [`ExportingTelemetry`] queues records for a [`TelemetryExporter`]
//! - [`NoOpTelemetry`] discards records but keeps span accounting

mod emitter;
mod event;
mod exporter;
mod exporting;
mod ledger;
pub mod names;

pub use emitter::{InMemoryTelemetry, NoOpTelemetry, TelemetryEmitter};
pub use event::{attributes, Attributes, SpanStatus, TelemetryEvent, TelemetryKind};
#[cfg(feature = "http-export")]
pub use exporter::HttpExporter;
pub use exporter::{JsonLinesExporter, LoggingExporter, NoOpExporter, TelemetryExporter};
pub use exporting::{ExportMetrics, ExportSettings, ExportingTelemetry};
pub use ledger::{OpenSpan, SpanHandle, SpanLedger, SpanReport};
