//! One wide event per pipeline run.

use crate::core::{PipelineRun, RunStatus, StageStatus};
use crate::telemetry::{attributes, Attributes};
use serde::Serialize;
use std::time::Duration;
use tracing::info;

/// Everything an operator needs to know about a run in one record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Run id.
    pub run_id: String,
    /// Transaction id.
    pub transaction_id: String,
    /// Customer id.
    pub customer_id: String,
    /// Final status.
    pub status: RunStatus,
    /// Number of stage results appended.
    pub stages_recorded: usize,
    /// Successful stage results.
    pub stages_success: usize,
    /// Failed stage results.
    pub stages_failed: usize,
    /// Skipped stage results.
    pub stages_skipped: usize,
    /// Decision outcome, if decided.
    pub outcome: Option<String>,
    /// Decision reason code, if decided.
    pub reason_code: Option<String>,
    /// Decided risk score.
    pub risk_score: Option<f64>,
    /// Abort reason for aborted runs.
    pub abort_reason: Option<String>,
    /// Wall clock time of the run.
    pub duration_ms: f64,
}

impl RunSummary {
    /// Summarizes a finalized run.
    #[must_use]
    pub fn from_run(run: &PipelineRun, elapsed: Duration) -> Self {
        let count = |status: StageStatus| run.results().iter().filter(|r| r.status == status).count();
        let decision = run.decision();

        Self {
            run_id: run.run_id().to_string(),
            transaction_id: run.transaction().transaction_id().to_string(),
            customer_id: run.transaction().customer_id().to_string(),
            status: run.status(),
            stages_recorded: run.results().len(),
            stages_success: count(StageStatus::Success),
            stages_failed: count(StageStatus::Failed),
            stages_skipped: count(StageStatus::Skipped),
            outcome: decision.map(|d| d.outcome.to_string()),
            reason_code: decision.map(|d| d.reason_code.to_string()),
            risk_score: decision.and_then(|d| d.risk_score),
            abort_reason: run.abort_reason().map(ToString::to_string),
            duration_ms: elapsed.as_secs_f64() * 1000.0,
        }
    }

    /// Flattens the summary into telemetry attributes.
    #[must_use]
    pub fn to_attributes(&self) -> Attributes {
        attributes(serde_json::json!({
            "run.id": self.run_id,
            "run.status": self.status.to_string(),
            "run.duration_ms": self.duration_ms,
            "transaction.id": self.transaction_id,
            "customer.id": self.customer_id,
            "stages.recorded": self.stages_recorded,
            "stages.success": self.stages_success,
            "stages.failed": self.stages_failed,
            "stages.skipped": self.stages_skipped,
            "decision.outcome": self.outcome,
            "decision.reason_code": self.reason_code,
            "decision.risk_score": self.risk_score,
            "abort.reason": self.abort_reason,
        }))
    }

    /// Writes the summary as a single structured log line.
    pub fn log(&self) {
        info!(
            run_id = %self.run_id,
            transaction_id = %self.transaction_id,
            status = %self.status,
            stages = self.stages_recorded,
            failed = self.stages_failed,
            outcome = self.outcome.as_deref().unwrap_or("none"),
            reason_code = self.reason_code.as_deref().unwrap_or("none"),
            duration_ms = self.duration_ms,
            "Pipeline run summary"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{AbortReason, Decision, Outcome, ReasonCode, StageResult, Transaction};
    use crate::errors::FatalFailure;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn test_summary_counts_statuses() {
        let mut run = PipelineRun::new(Transaction::new("tx-1", "cust-1", 10.0));
        run.start().unwrap();
        run.append(StageResult::success("a", 0, HashMap::new(), BTreeMap::new(), Duration::ZERO))
            .unwrap();
        run.append(StageResult::failed("b", 1, "down", Duration::ZERO)).unwrap();
        run.append(StageResult::skipped("c", 2, "idle", Duration::ZERO)).unwrap();
        run.complete(
            Decision::new(Outcome::Investigate, ReasonCode::RiskScoreUnavailable, vec![1]),
        )
        .unwrap();

        let summary = RunSummary::from_run(&run, Duration::from_millis(12));

        assert_eq!(summary.stages_recorded, 3);
        assert_eq!(summary.stages_success, 1);
        assert_eq!(summary.stages_failed, 1);
        assert_eq!(summary.stages_skipped, 1);
        assert_eq!(summary.outcome.as_deref(), Some("investigate"));
        assert!(summary.abort_reason.is_none());

        let attrs = summary.to_attributes();
        assert_eq!(attrs["run.status"], "completed");
        assert_eq!(attrs["decision.reason_code"], "risk_score_unavailable");
    }

    #[test]
    fn test_summary_for_aborted_run() {
        let mut run = PipelineRun::new(Transaction::new("tx-2", "cust-9", 10.0));
        run.start().unwrap();
        run.abort(AbortReason::Fatal(FatalFailure::new("customer_data", "unknown customer")), None)
            .unwrap();

        let summary = RunSummary::from_run(&run, Duration::ZERO);

        assert_eq!(summary.status, RunStatus::Aborted);
        assert!(summary.outcome.is_none());
        assert!(summary.abort_reason.unwrap().contains("unknown customer"));
    }
}
