//! The telemetry emitter trait and its synchronous implementations.

use super::{Attributes, SpanHandle, SpanLedger, SpanReport, SpanStatus, TelemetryEvent, TelemetryKind};
use parking_lot::RwLock;
use tracing::warn;

/// Uniform span/metric/event emission.
///
/// Implementors supply a [`SpanLedger`] and a `dispatch` sink; the
/// provided methods build [`TelemetryEvent`]s and keep span accounting.
/// Every call is fire-and-forget: `dispatch` must swallow (and log) its
/// own failures.
pub trait TelemetryEmitter: Send + Sync {
    /// The ledger tracking this emitter's spans.
    fn ledger(&self) -> &SpanLedger;

    /// Hands a finished record to the backend.
    fn dispatch(&self, event: TelemetryEvent);

    /// Starts a span tagged with the correlation id.
    fn start_span(&self, name: &str, correlation_id: &str, attributes: Attributes) -> SpanHandle {
        let handle = self.ledger().open(name, correlation_id);
        self.dispatch(TelemetryEvent::span_start(correlation_id, name, handle.id(), attributes));
        handle
    }

    /// Ends a span.
    fn end_span(&self, handle: SpanHandle, status: SpanStatus) {
        match self.ledger().close(&handle) {
            Some(duration_ms) => self.dispatch(TelemetryEvent::span_end(
                handle.correlation_id(),
                handle.name(),
                handle.id(),
                status,
                duration_ms,
            )),
            None => warn!(
                span_name = handle.name(),
                span_id = handle.id(),
                "end_span called with a handle this emitter did not open"
            ),
        }
    }

    /// Records a metric value.
    fn record_metric(&self, correlation_id: &str, name: &str, value: f64, tags: Attributes) {
        self.dispatch(TelemetryEvent::metric(correlation_id, name, value, tags));
    }

    /// Records a custom event.
    fn record_event(&self, correlation_id: &str, name: &str, attributes: Attributes) {
        self.dispatch(TelemetryEvent::event(correlation_id, name, attributes));
    }

    /// Returns the current span balance.
    fn span_report(&self) -> SpanReport {
        self.ledger().report()
    }
}

/// Discards every record but still tracks span balance.
#[derive(Debug, Default)]
pub struct NoOpTelemetry {
    ledger: SpanLedger,
}

impl NoOpTelemetry {
    /// Creates a new no-op emitter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl TelemetryEmitter for NoOpTelemetry {
    fn ledger(&self) -> &SpanLedger {
        &self.ledger
    }

    fn dispatch(&self, _event: TelemetryEvent) {}
}

/// Keeps every record in memory, in emission order.
///
/// Used by tests and for in-process audit trails.
#[derive(Debug, Default)]
pub struct InMemoryTelemetry {
    ledger: SpanLedger,
    events: RwLock<Vec<TelemetryEvent>>,
}

impl InMemoryTelemetry {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected records.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.read().clone()
    }

    /// Returns the number of collected records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if nothing has been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears collected records. Span accounting is kept.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns records whose name starts with `prefix`.
    #[must_use]
    pub fn events_named(&self, prefix: &str) -> Vec<TelemetryEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.name.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Returns records for one correlation id.
    #[must_use]
    pub fn events_for(&self, correlation_id: &str) -> Vec<TelemetryEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect()
    }

    /// Counts records of a kind, optionally restricted to one span phase.
    #[must_use]
    pub fn count(&self, kind: TelemetryKind, span_phase: Option<&str>) -> usize {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind && (span_phase.is_none() || e.span_phase() == span_phase))
            .count()
    }

    /// Returns the values recorded for a metric name.
    #[must_use]
    pub fn metric_values(&self, name: &str) -> Vec<f64> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == TelemetryKind::Metric && e.name == name)
            .filter_map(TelemetryEvent::metric_value)
            .collect()
    }
}

impl TelemetryEmitter for InMemoryTelemetry {
    fn ledger(&self) -> &SpanLedger {
        &self.ledger
    }

    fn dispatch(&self, event: TelemetryEvent) {
        self.events.write().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::attributes;

    #[test]
    fn test_in_memory_span_roundtrip() {
        let telemetry = InMemoryTelemetry::new();
        let span = telemetry.start_span("stage.risk", "run-1", attributes(serde_json::json!({"stage.name": "risk"})));
        telemetry.end_span(span, SpanStatus::Ok);

        assert_eq!(telemetry.count(TelemetryKind::Span, Some("start")), 1);
        assert_eq!(telemetry.count(TelemetryKind::Span, Some("end")), 1);
        assert!(telemetry.span_report().is_balanced());

        let events = telemetry.events();
        assert_eq!(events[0].attributes["stage.name"], "risk");
        assert_eq!(events[1].attributes["span.status"], "ok");
    }

    #[test]
    fn test_in_memory_metrics_and_events() {
        let telemetry = InMemoryTelemetry::new();
        telemetry.record_metric("run-1", "fraud_detection.risk_score", 0.4, Attributes::new());
        telemetry.record_event("run-2", "pipeline.completed", Attributes::new());

        assert_eq!(telemetry.metric_values("fraud_detection.risk_score"), vec![0.4]);
        assert_eq!(telemetry.events_for("run-2").len(), 1);
        assert_eq!(telemetry.events_named("pipeline.").len(), 1);
    }

    #[test]
    fn test_foreign_handle_is_ignored() {
        let a = InMemoryTelemetry::new();
        let b = InMemoryTelemetry::new();
        let own = a.start_span("own", "run-1", Attributes::new());
        let foreign = b.start_span("foreign", "run-1", Attributes::new());

        a.end_span(foreign, SpanStatus::Ok);
        assert_eq!(a.span_report().ended, 0);
        assert_eq!(b.span_report().unterminated.len(), 1);

        a.end_span(own, SpanStatus::Ok);
        assert!(a.span_report().is_balanced());
    }

    #[test]
    fn test_noop_tracks_balance() {
        let telemetry = NoOpTelemetry::new();
        let span = telemetry.start_span("x", "run", Attributes::new());
        assert_eq!(telemetry.span_report().started, 1);
        telemetry.end_span(span, SpanStatus::Error);
        assert!(telemetry.span_report().is_balanced());
    }
}
