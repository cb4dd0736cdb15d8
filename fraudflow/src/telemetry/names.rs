//! Metric and event names shared by stages and the pipeline.

/// Transactions that entered the customer data stage.
pub const TRANSACTIONS_PROCESSED: &str = "fraud_detection.transactions_processed";
/// Risk score recorded by the risk analysis stage, in `[0, 1]`.
pub const RISK_SCORE: &str = "fraud_detection.risk_score";
/// Confidence derived from the distance of the score to 0.5.
pub const MODEL_CONFIDENCE: &str = "fraud_detection.model_confidence";
/// Alerts raised by the alert stage.
pub const ALERTS_CREATED: &str = "fraud_detection.alerts_created";
/// Amount blocked on BLOCK recommendations.
pub const FRAUD_PREVENTED_AMOUNT: &str = "fraud_detection.fraud_prevented_amount";
/// Suspicious activity reports filed.
pub const SAR_FILED: &str = "fraud_detection.sar_filed";
/// Step-up authentication or declines imposed on a customer.
pub const CUSTOMER_FRICTION: &str = "fraud_detection.customer_friction";
/// Per-stage wall-clock duration.
pub const STAGE_DURATION_MS: &str = "fraud_detection.stage_duration_ms";

/// Span wrapping a whole run.
pub const PIPELINE_SPAN: &str = "pipeline.run";
/// Emitted once a run completes.
pub const PIPELINE_COMPLETED: &str = "pipeline.completed";
/// Emitted once a run aborts.
pub const PIPELINE_ABORTED: &str = "pipeline.aborted";
/// Wide event summarizing a finished run.
pub const PIPELINE_RUN_SUMMARY: &str = "pipeline.run_summary";

/// Span name for a stage.
#[must_use]
pub fn stage_span(stage: &str) -> String {
    format!("stage.{stage}")
}

/// Business event name for a stage phase, e.g. `fraud_detection.risk_analysis.started`.
#[must_use]
pub fn stage_event(stage: &str, phase: &str) -> String {
    format!("fraud_detection.{stage}.{phase}")
}
