//! Stage trait and implementations.
//!
//! Stages are the units of decision logic in a fraudflow pipeline. A stage
//! reads the results recorded before it through a [`StageContext`] and hands
//! back a [`StageOutcome`]; the pipeline owns recording and span handling.

mod alert;
mod customer_data;
mod reasoning;
mod risk;

pub use alert::{AlertSettings, FraudAlertStage, Severity};
pub use customer_data::{CustomerDataStage, CustomerDirectory, CustomerProfile, InMemoryCustomerDirectory};
pub use reasoning::{ReasoningProvider, ReasoningResponse, StaticReasoningProvider};
pub use risk::{parse_risk_score, rule_score, Recommendation, RiskAnalysisStage, RiskLevel};

use crate::core::{PipelineRun, StageOutcome, StageResult, Transaction};
use crate::telemetry::{Attributes, TelemetryEmitter};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Trait for pipeline stages.
///
/// Implementations must not panic; every failure mode is expressed as a
/// [`StageOutcome`].
#[async_trait]
pub trait PipelineStage: Send + Sync + Debug {
    /// Returns the name of the stage.
    fn name(&self) -> &str;

    /// Executes the stage.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Read access to the run so far plus telemetry
    ///
    /// # Returns
    ///
    /// The stage outcome indicating success, failure, skip or fatal abort.
    async fn execute(&self, ctx: &StageContext<'_>) -> StageOutcome;
}

/// What a stage can see while it executes.
///
/// Holds a shared borrow of the in-progress run, so a stage can read the
/// results recorded before it and nothing else.
pub struct StageContext<'a> {
    run: &'a PipelineRun,
    telemetry: &'a dyn TelemetryEmitter,
    stage: &'a str,
    sequence: usize,
    correlation_id: String,
    recorded: Mutex<BTreeMap<String, f64>>,
}

impl<'a> StageContext<'a> {
    /// Creates a context for the stage about to run at `sequence`.
    #[must_use]
    pub fn new(run: &'a PipelineRun, telemetry: &'a dyn TelemetryEmitter, stage: &'a str, sequence: usize) -> Self {
        Self {
            run,
            telemetry,
            stage,
            sequence,
            correlation_id: run.correlation_id(),
            recorded: Mutex::new(BTreeMap::new()),
        }
    }

    /// Returns the run being executed.
    #[must_use]
    pub fn run(&self) -> &'a PipelineRun {
        self.run
    }

    /// Returns the transaction under evaluation.
    #[must_use]
    pub fn transaction(&self) -> &'a Transaction {
        self.run.transaction()
    }

    /// Returns the run's correlation id.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Returns the name of the executing stage.
    #[must_use]
    pub fn stage_name(&self) -> &str {
        self.stage
    }

    /// Returns the sequence number the stage's result will get.
    #[must_use]
    pub fn sequence(&self) -> usize {
        self.sequence
    }

    /// Returns the telemetry emitter.
    #[must_use]
    pub fn telemetry(&self) -> &'a dyn TelemetryEmitter {
        self.telemetry
    }

    /// Returns the most recent successful prior result carrying `key`.
    #[must_use]
    pub fn latest_with(&self, key: &str) -> Option<&'a StageResult> {
        self.run.latest_with(key)
    }

    /// Records a metric tagged with the stage name.
    ///
    /// The value is also kept on the stage's result.
    pub fn record_metric(&self, name: &str, value: f64, mut tags: Attributes) {
        tags.insert("stage.name".to_string(), serde_json::json!(self.stage));
        self.telemetry.record_metric(&self.correlation_id, name, value, tags);
        self.recorded.lock().insert(name.to_string(), value);
    }

    /// Records a business event tagged with the stage name.
    pub fn record_event(&self, name: &str, mut attributes: Attributes) {
        attributes.insert("stage.name".to_string(), serde_json::json!(self.stage));
        self.telemetry.record_event(&self.correlation_id, name, attributes);
    }

    /// Takes the metrics recorded so far.
    pub(crate) fn take_metrics(&self) -> BTreeMap<String, f64> {
        std::mem::take(&mut *self.recorded.lock())
    }
}

impl Debug for StageContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageContext")
            .field("stage", &self.stage)
            .field("sequence", &self.sequence)
            .field("correlation_id", &self.correlation_id)
            .finish_non_exhaustive()
    }
}

/// A simple function-based stage.
pub struct FnStage<F>
where
    F: Fn(&StageContext<'_>) -> StageOutcome + Send + Sync,
{
    name: String,
    func: F,
}

impl<F> FnStage<F>
where
    F: Fn(&StageContext<'_>) -> StageOutcome + Send + Sync,
{
    /// Creates a new function-based stage.
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> Debug for FnStage<F>
where
    F: Fn(&StageContext<'_>) -> StageOutcome + Send + Sync,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnStage").field("name", &self.name).finish()
    }
}

#[async_trait]
impl<F> PipelineStage for FnStage<F>
where
    F: Fn(&StageContext<'_>) -> StageOutcome + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> StageOutcome {
        (self.func)(ctx)
    }
}

/// A stage that succeeds with an empty payload.
#[derive(Debug, Clone)]
pub struct NoOpStage {
    name: String,
}

impl NoOpStage {
    /// Creates a new no-op stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl PipelineStage for NoOpStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext<'_>) -> StageOutcome {
        StageOutcome::ok_empty()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::core::{PipelineRun, StageResult, Transaction};
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;

    /// A running run with the given successful results already recorded.
    pub fn running_run(transaction: Transaction, prior: Vec<(&str, serde_json::Value)>) -> PipelineRun {
        let mut run = PipelineRun::new(transaction);
        run.start().unwrap();
        for (sequence, (stage, payload)) in prior.into_iter().enumerate() {
            let payload: HashMap<String, serde_json::Value> = serde_json::from_value(payload).unwrap();
            run.append(StageResult::success(stage, sequence, payload, BTreeMap::new(), Duration::ZERO))
                .unwrap();
        }
        run
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::running_run;
    use super::*;
    use crate::telemetry::{InMemoryTelemetry, TelemetryKind};

    #[tokio::test]
    async fn test_fn_stage() {
        let stage = FnStage::new("test", |ctx: &StageContext<'_>| {
            StageOutcome::ok_value("amount", serde_json::json!(ctx.transaction().amount()))
        });
        assert_eq!(stage.name(), "test");

        let run = running_run(Transaction::new("tx-1", "cust-1", 12.5), vec![]);
        let telemetry = InMemoryTelemetry::new();
        let ctx = StageContext::new(&run, &telemetry, "test", 0);

        let outcome = stage.execute(&ctx).await;
        assert_eq!(outcome, StageOutcome::ok_value("amount", serde_json::json!(12.5)));
    }

    #[tokio::test]
    async fn test_noop_stage() {
        let stage = NoOpStage::new("noop");
        let run = running_run(Transaction::new("tx-1", "cust-1", 1.0), vec![]);
        let telemetry = InMemoryTelemetry::new();
        let ctx = StageContext::new(&run, &telemetry, "noop", 0);

        assert_eq!(stage.name(), "noop");
        assert!(matches!(stage.execute(&ctx).await, StageOutcome::Success { .. }));
    }

    #[test]
    fn test_context_tags_telemetry() {
        let run = running_run(Transaction::new("tx-1", "cust-1", 1.0), vec![]);
        let telemetry = InMemoryTelemetry::new();
        let ctx = StageContext::new(&run, &telemetry, "risk_analysis", 1);

        ctx.record_metric("fraud_detection.risk_score", 0.5, Attributes::new());
        ctx.record_event("fraud_detection.risk_analysis.started", Attributes::new());

        let events = telemetry.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.correlation_id == run.correlation_id()));
        assert!(events.iter().all(|e| e.attributes["stage.name"] == "risk_analysis"));
        assert_eq!(telemetry.count(TelemetryKind::Metric, None), 1);

        let metrics = ctx.take_metrics();
        assert_eq!(metrics.get("fraud_detection.risk_score"), Some(&0.5));
        assert!(ctx.take_metrics().is_empty());
    }

    #[test]
    fn test_context_reads_prior_results() {
        let run = running_run(
            Transaction::new("tx-1", "cust-1", 1.0),
            vec![("customer_data", serde_json::json!({"amount_ratio": 2.0}))],
        );
        let telemetry = InMemoryTelemetry::new();
        let ctx = StageContext::new(&run, &telemetry, "risk_analysis", 1);

        assert_eq!(ctx.sequence(), 1);
        assert_eq!(ctx.latest_with("amount_ratio").map(|r| r.stage.as_str()), Some("customer_data"));
        assert!(ctx.latest_with("risk_score").is_none());
    }
}
