//! Assertions over finished runs and emitted telemetry.

use crate::core::{Outcome, PipelineRun, ReasonCode, StageStatus};
use crate::telemetry::{TelemetryEmitter, TelemetryEvent};

/// Asserts that the run recorded exactly these statuses, in order.
pub fn assert_stage_statuses(run: &PipelineRun, expected: &[StageStatus]) {
    let actual: Vec<StageStatus> = run.results().iter().map(|r| r.status).collect();
    assert_eq!(actual, expected, "Unexpected stage statuses for run {}", run.run_id());
}

/// Asserts the run's decision outcome and reason code.
pub fn assert_decision(run: &PipelineRun, outcome: Outcome, reason_code: ReasonCode) {
    let decision = run
        .decision()
        .unwrap_or_else(|| panic!("Run {} has no decision (status {})", run.run_id(), run.status()));
    assert_eq!(
        (decision.outcome, decision.reason_code),
        (outcome, reason_code),
        "Unexpected decision {decision:?}"
    );
}

/// Asserts that every span the emitter opened was closed.
pub fn assert_spans_balanced(telemetry: &dyn TelemetryEmitter) {
    let report = telemetry.span_report();
    assert!(
        report.is_balanced(),
        "Unterminated spans: {:?}",
        report.unterminated
    );
}

/// Asserts that every record carries the given correlation id.
pub fn assert_all_correlated(events: &[TelemetryEvent], correlation_id: &str) {
    assert!(!events.is_empty(), "No telemetry recorded");
    for event in events {
        assert_eq!(
            event.correlation_id, correlation_id,
            "Record '{}' carries the wrong correlation id",
            event.name
        );
    }
}
