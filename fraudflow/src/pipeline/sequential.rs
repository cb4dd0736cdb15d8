//! Sequential stage execution.

use crate::cancellation::CancellationToken;
use crate::core::{AbortReason, PipelineRun, RunStatus, StageOutcome, StageResult, StageStatus, Transaction};
use crate::errors::{FatalFailure, FraudflowError};
use crate::observability::RunSummary;
use crate::policy::{AbortFallback, DecisionPolicy};
use crate::stages::{PipelineStage, StageContext};
use crate::telemetry::{attributes, names, SpanStatus, TelemetryEmitter};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// One scheduled stage with its execution settings.
#[derive(Debug, Clone)]
pub(crate) struct StageSlot {
    pub(crate) stage: Arc<dyn PipelineStage>,
    pub(crate) name: String,
    pub(crate) enabled: bool,
    pub(crate) timeout: Duration,
    pub(crate) fatal_on_timeout: bool,
}

/// Runs stages strictly in order and decides the result.
///
/// Each run moves `Pending -> Running -> Completed | Aborted`. A fatal
/// stage outcome or a cancelled token aborts the run; every other outcome
/// is recorded and the next stage starts. Completed runs are decided by
/// the [`DecisionPolicy`] exactly once.
#[derive(Clone)]
pub struct SequentialPipeline {
    slots: Vec<StageSlot>,
    policy: DecisionPolicy,
    abort_fallback: AbortFallback,
    telemetry: Arc<dyn TelemetryEmitter>,
}

impl SequentialPipeline {
    pub(crate) fn new(
        slots: Vec<StageSlot>,
        policy: DecisionPolicy,
        abort_fallback: AbortFallback,
        telemetry: Arc<dyn TelemetryEmitter>,
    ) -> Self {
        Self {
            slots,
            policy,
            abort_fallback,
            telemetry,
        }
    }

    /// Returns the stage names in execution order.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&str> {
        self.slots.iter().map(|s| s.name.as_str()).collect()
    }

    /// Returns the decision policy.
    #[must_use]
    pub fn policy(&self) -> &DecisionPolicy {
        &self.policy
    }

    /// Returns the telemetry emitter.
    #[must_use]
    pub fn telemetry(&self) -> &Arc<dyn TelemetryEmitter> {
        &self.telemetry
    }

    /// Runs a transaction through every stage.
    ///
    /// # Errors
    ///
    /// Returns [`FraudflowError::RunState`] only if the run's state machine
    /// is violated, which indicates a bug.
    pub async fn run(&self, transaction: Transaction) -> Result<PipelineRun, FraudflowError> {
        self.run_with_cancel(transaction, &CancellationToken::new()).await
    }

    /// Runs a transaction, checking `cancel` before each stage.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn run_with_cancel(
        &self,
        transaction: Transaction,
        cancel: &CancellationToken,
    ) -> Result<PipelineRun, FraudflowError> {
        let mut run = PipelineRun::new(transaction);
        let correlation_id = run.correlation_id();
        let started = Instant::now();

        let span = self.telemetry.start_span(
            names::PIPELINE_SPAN,
            &correlation_id,
            attributes(serde_json::json!({
                "correlation.id": correlation_id,
                "transaction.id": run.transaction().transaction_id(),
                "customer.id": run.transaction().customer_id(),
                "pipeline.stage_count": self.slots.len(),
            })),
        );

        let executed = self.execute(&mut run, &correlation_id, cancel).await;

        let status = match (&executed, run.status()) {
            (Ok(()), RunStatus::Completed) => SpanStatus::Ok,
            _ => SpanStatus::Error,
        };
        self.telemetry.end_span(span, status);

        executed?;

        let summary = RunSummary::from_run(&run, started.elapsed());
        self.telemetry
            .record_event(&correlation_id, names::PIPELINE_RUN_SUMMARY, summary.to_attributes());
        summary.log();

        Ok(run)
    }

    async fn execute(
        &self,
        run: &mut PipelineRun,
        correlation_id: &str,
        cancel: &CancellationToken,
    ) -> Result<(), FraudflowError> {
        run.start()?;
        info!(
            run_id = %run.run_id(),
            transaction_id = run.transaction().transaction_id(),
            stages = self.slots.len(),
            "Pipeline run started"
        );

        for (sequence, slot) in self.slots.iter().enumerate() {
            if cancel.is_cancelled() {
                let reason = cancel.reason().unwrap_or_else(|| "cancelled".to_string());
                return self.abort(run, correlation_id, AbortReason::Cancelled { reason }, None);
            }

            let span = self.telemetry.start_span(
                &names::stage_span(&slot.name),
                correlation_id,
                attributes(serde_json::json!({
                    "stage.name": slot.name,
                    "correlation.id": correlation_id,
                    "stage.sequence": sequence,
                })),
            );

            let (outcome, metrics, duration) = if slot.enabled {
                self.dispatch(slot, run, sequence).await
            } else {
                (
                    StageOutcome::skip("stage disabled by configuration"),
                    std::collections::BTreeMap::new(),
                    Duration::ZERO,
                )
            };

            self.telemetry.record_metric(
                correlation_id,
                names::STAGE_DURATION_MS,
                duration.as_secs_f64() * 1000.0,
                attributes(serde_json::json!({
                    "stage.name": slot.name,
                    "stage.outcome": outcome.label(),
                })),
            );

            let result = match outcome {
                StageOutcome::Success {
                    payload,
                    metrics: reported,
                } => {
                    let mut metrics = metrics;
                    for (name, value) in reported {
                        self.telemetry.record_metric(
                            correlation_id,
                            &name,
                            value,
                            attributes(serde_json::json!({"stage.name": slot.name})),
                        );
                        metrics.insert(name, value);
                    }
                    StageResult::success(&slot.name, sequence, payload, metrics, duration)
                }
                StageOutcome::Failed { reason } => {
                    warn!(stage = %slot.name, %reason, "Stage failed, continuing");
                    let mut result = StageResult::failed(&slot.name, sequence, reason, duration);
                    result.metrics = metrics;
                    result
                }
                StageOutcome::Skipped { reason } => {
                    debug!(stage = %slot.name, %reason, "Stage skipped");
                    let mut result = StageResult::skipped(&slot.name, sequence, reason, duration);
                    result.metrics = metrics;
                    result
                }
                StageOutcome::Fatal { reason } => {
                    self.telemetry.end_span(span, SpanStatus::Error);
                    let mut result = StageResult::failed(&slot.name, sequence, reason.clone(), duration);
                    result.metrics = metrics;
                    run.append(result)?;
                    let failure = FatalFailure::new(&slot.name, reason);
                    return self.abort(run, correlation_id, AbortReason::Fatal(failure), Some(slot.name.as_str()));
                }
            };

            let span_status = match result.status {
                StageStatus::Success => SpanStatus::Ok,
                StageStatus::Failed => SpanStatus::Error,
                StageStatus::Skipped => SpanStatus::Skipped,
            };
            self.telemetry.end_span(span, span_status);
            run.append(result)?;
        }

        let decision = self.policy.decide(run);
        self.telemetry.record_event(
            correlation_id,
            names::PIPELINE_COMPLETED,
            attributes(serde_json::json!({
                "decision.outcome": decision.outcome,
                "decision.reason_code": decision.reason_code,
                "decision.risk_score": decision.risk_score,
            })),
        );
        info!(
            run_id = %run.run_id(),
            outcome = %decision.outcome,
            reason_code = %decision.reason_code,
            "Pipeline run completed"
        );
        run.complete(decision)?;
        Ok(())
    }

    async fn dispatch(
        &self,
        slot: &StageSlot,
        run: &PipelineRun,
        sequence: usize,
    ) -> (StageOutcome, std::collections::BTreeMap<String, f64>, Duration) {
        let ctx = StageContext::new(run, self.telemetry.as_ref(), &slot.name, sequence);
        let started = Instant::now();

        let outcome = match tokio::time::timeout(slot.timeout, slot.stage.execute(&ctx)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                let reason = format!("stage timed out after {}ms", slot.timeout.as_millis());
                warn!(stage = %slot.name, timeout_ms = slot.timeout.as_millis(), fatal = slot.fatal_on_timeout, "Stage timed out");
                if slot.fatal_on_timeout {
                    StageOutcome::fatal(reason)
                } else {
                    StageOutcome::fail(reason)
                }
            }
        };

        (outcome, ctx.take_metrics(), started.elapsed())
    }

    fn abort(
        &self,
        run: &mut PipelineRun,
        correlation_id: &str,
        reason: AbortReason,
        stage: Option<&str>,
    ) -> Result<(), FraudflowError> {
        let fallback = self.abort_fallback.decision(run);
        self.telemetry.record_event(
            correlation_id,
            names::PIPELINE_ABORTED,
            attributes(serde_json::json!({
                "abort.reason": reason.to_string(),
                "abort.stage": stage,
                "abort.recorded_stages": run.results().len(),
                "decision.outcome": fallback.as_ref().map(|d| d.outcome),
            })),
        );
        warn!(run_id = %run.run_id(), stage = ?stage, %reason, "Pipeline run aborted");
        run.abort(reason, fallback)?;
        Ok(())
    }
}

impl std::fmt::Debug for SequentialPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequentialPipeline")
            .field("stages", &self.stage_names())
            .field("policy", &self.policy)
            .field("abort_fallback", &self.abort_fallback)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SequentialPipelineBuilder;
    use crate::stages::{FnStage, NoOpStage};
    use crate::telemetry::{InMemoryTelemetry, TelemetryKind};

    fn pipeline_with(stages: Vec<Arc<dyn PipelineStage>>, telemetry: Arc<InMemoryTelemetry>) -> SequentialPipeline {
        let mut builder = SequentialPipelineBuilder::new().with_telemetry(telemetry);
        for stage in stages {
            builder = builder.stage(stage).unwrap();
        }
        builder.build().unwrap()
    }

    #[tokio::test]
    async fn test_stage_metrics_recorded_on_result() {
        let telemetry = Arc::new(InMemoryTelemetry::new());
        let stage = FnStage::new("scorer", |ctx: &StageContext<'_>| {
            ctx.record_metric("custom.recorded", 2.0, crate::telemetry::Attributes::new());
            StageOutcome::ok_empty().with_metric("custom.reported", 3.0)
        });
        let pipeline = pipeline_with(vec![Arc::new(stage) as Arc<dyn PipelineStage>], telemetry.clone());

        let run = pipeline.run(Transaction::new("tx-1", "cust-1", 1.0)).await.unwrap();

        let metrics = &run.results()[0].metrics;
        assert_eq!(metrics.get("custom.recorded"), Some(&2.0));
        assert_eq!(metrics.get("custom.reported"), Some(&3.0));
        assert_eq!(telemetry.metric_values("custom.reported"), vec![3.0]);
    }

    #[tokio::test]
    async fn test_spans_named_and_tagged() {
        let telemetry = Arc::new(InMemoryTelemetry::new());
        let pipeline = pipeline_with(vec![Arc::new(NoOpStage::new("only")) as Arc<dyn PipelineStage>], telemetry.clone());

        let run = pipeline.run(Transaction::new("tx-1", "cust-1", 1.0)).await.unwrap();

        let starts: Vec<_> = telemetry
            .events()
            .into_iter()
            .filter(|e| e.kind == TelemetryKind::Span && e.span_phase() == Some("start"))
            .collect();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0].name, names::PIPELINE_SPAN);
        assert_eq!(starts[1].name, "stage.only");
        assert_eq!(starts[1].attributes["stage.name"], "only");
        assert_eq!(starts[1].attributes["correlation.id"], run.correlation_id());
        assert!(telemetry.span_report().is_balanced());
    }

    #[tokio::test]
    async fn test_run_summary_emitted() {
        let telemetry = Arc::new(InMemoryTelemetry::new());
        let pipeline = pipeline_with(vec![Arc::new(NoOpStage::new("only")) as Arc<dyn PipelineStage>], telemetry.clone());

        pipeline.run(Transaction::new("tx-1", "cust-1", 1.0)).await.unwrap();

        let summaries = telemetry.events_named(names::PIPELINE_RUN_SUMMARY);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].attributes["run.status"], "completed");
        assert_eq!(summaries[0].attributes["stages.success"], 1);
    }

    #[tokio::test]
    async fn test_fatal_stage_result_recorded() {
        let telemetry = Arc::new(InMemoryTelemetry::new());
        let gate = FnStage::new("gate", |ctx: &StageContext<'_>| {
            ctx.record_metric("custom.checked", 1.0, crate::telemetry::Attributes::new());
            StageOutcome::fatal("sanctioned counterparty")
        });
        let pipeline = pipeline_with(
            vec![
                Arc::new(NoOpStage::new("first")) as Arc<dyn PipelineStage>,
                Arc::new(gate) as Arc<dyn PipelineStage>,
                Arc::new(NoOpStage::new("never")) as Arc<dyn PipelineStage>,
            ],
            telemetry.clone(),
        );

        let run = pipeline.run(Transaction::new("tx-1", "cust-1", 1.0)).await.unwrap();

        assert_eq!(run.status(), RunStatus::Aborted);
        assert_eq!(run.results().len(), 2);
        let fatal = &run.results()[1];
        assert_eq!(fatal.stage, "gate");
        assert_eq!(fatal.sequence, 1);
        assert_eq!(fatal.status, StageStatus::Failed);
        assert_eq!(fatal.reason.as_deref(), Some("sanctioned counterparty"));
        assert_eq!(fatal.metrics.get("custom.checked"), Some(&1.0));
        assert_eq!(run.decision().unwrap().contributing, vec![1]);
        assert_eq!(telemetry.count(TelemetryKind::Span, Some("start")), 3);
        assert!(telemetry.span_report().is_balanced());
    }
}
