//! Telemetry event records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Free-form attributes attached to spans, metrics and events.
pub type Attributes = serde_json::Map<String, serde_json::Value>;

/// Builds [`Attributes`] from a `json!` object. Non-objects yield an empty map.
#[must_use]
pub fn attributes(value: serde_json::Value) -> Attributes {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

/// The kind of telemetry record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryKind {
    /// Span start or end (see the `span.phase` attribute).
    Span,
    /// A numeric measurement.
    Metric,
    /// A named business or lifecycle event.
    Event,
}

impl fmt::Display for TelemetryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Span => write!(f, "span"),
            Self::Metric => write!(f, "metric"),
            Self::Event => write!(f, "event"),
        }
    }
}

/// Final status of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanStatus {
    /// The wrapped work succeeded.
    Ok,
    /// The wrapped work failed.
    Error,
    /// The wrapped work was skipped.
    Skipped,
}

impl fmt::Display for SpanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error => write!(f, "error"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// One telemetry record as exported to a backend.
///
/// Serializes to `{correlationId, kind, name, timestampUtc, attributes}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    /// Run identifier joining all telemetry of one transaction.
    pub correlation_id: String,
    /// Record kind.
    pub kind: TelemetryKind,
    /// Span, metric or event name.
    pub name: String,
    /// When the record was produced.
    pub timestamp_utc: DateTime<Utc>,
    /// Record attributes.
    #[serde(default)]
    pub attributes: Attributes,
}

impl TelemetryEvent {
    fn new(correlation_id: &str, kind: TelemetryKind, name: &str, attributes: Attributes) -> Self {
        Self {
            correlation_id: correlation_id.to_string(),
            kind,
            name: name.to_string(),
            timestamp_utc: Utc::now(),
            attributes,
        }
    }

    /// Creates a span-start record.
    #[must_use]
    pub fn span_start(correlation_id: &str, name: &str, span_id: u64, mut attributes: Attributes) -> Self {
        attributes.insert("span.id".to_string(), serde_json::json!(span_id));
        attributes.insert("span.phase".to_string(), serde_json::json!("start"));
        Self::new(correlation_id, TelemetryKind::Span, name, attributes)
    }

    /// Creates a span-end record.
    #[must_use]
    pub fn span_end(
        correlation_id: &str,
        name: &str,
        span_id: u64,
        status: SpanStatus,
        duration_ms: f64,
    ) -> Self {
        let mut attributes = Attributes::new();
        attributes.insert("span.id".to_string(), serde_json::json!(span_id));
        attributes.insert("span.phase".to_string(), serde_json::json!("end"));
        attributes.insert("span.status".to_string(), serde_json::json!(status));
        attributes.insert("span.duration_ms".to_string(), serde_json::json!(duration_ms));
        Self::new(correlation_id, TelemetryKind::Span, name, attributes)
    }

    /// Creates a metric record.
    #[must_use]
    pub fn metric(correlation_id: &str, name: &str, value: f64, mut tags: Attributes) -> Self {
        tags.insert("metric.value".to_string(), serde_json::json!(value));
        Self::new(correlation_id, TelemetryKind::Metric, name, tags)
    }

    /// Creates a custom event record.
    #[must_use]
    pub fn event(correlation_id: &str, name: &str, attributes: Attributes) -> Self {
        Self::new(correlation_id, TelemetryKind::Event, name, attributes)
    }

    /// Returns `start` or `end` for span records.
    #[must_use]
    pub fn span_phase(&self) -> Option<&str> {
        self.attributes.get("span.phase").and_then(serde_json::Value::as_str)
    }

    /// Returns the value of a metric record.
    #[must_use]
    pub fn metric_value(&self) -> Option<f64> {
        self.attributes.get("metric.value").and_then(serde_json::Value::as_f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_shape() {
        let event = TelemetryEvent::event("run-1", "pipeline.completed", attributes(serde_json::json!({"x": 1})));
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["correlationId"], "run-1");
        assert_eq!(json["kind"], "event");
        assert_eq!(json["name"], "pipeline.completed");
        assert!(json["timestampUtc"].is_string());
        assert_eq!(json["attributes"]["x"], 1);
    }

    #[test]
    fn test_span_phases() {
        let start = TelemetryEvent::span_start("run-1", "stage.risk", 7, Attributes::new());
        let end = TelemetryEvent::span_end("run-1", "stage.risk", 7, SpanStatus::Ok, 1.0);

        assert_eq!(start.kind, TelemetryKind::Span);
        assert_eq!(start.span_phase(), Some("start"));
        assert_eq!(end.span_phase(), Some("end"));
        assert_eq!(end.attributes["span.status"], "ok");
    }

    #[test]
    fn test_metric_value() {
        let metric = TelemetryEvent::metric("run-1", "fraud_detection.risk_score", 0.92, Attributes::new());
        assert_eq!(metric.metric_value(), Some(0.92));
    }

    #[test]
    fn test_attributes_non_object() {
        assert!(attributes(serde_json::json!([1, 2])).is_empty());
    }
}
