//! The append-only record of one pipeline execution.

use super::{Decision, RunStatus, StageResult, Transaction};
use crate::errors::{FatalFailure, FraudflowError, RunStateError};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Why a run stopped before every stage executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AbortReason {
    /// A stage reported a fatal failure.
    Fatal(FatalFailure),
    /// The run was cancelled between stages.
    Cancelled {
        /// Cancellation reason.
        reason: String,
    },
}

impl std::fmt::Display for AbortReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fatal(failure) => write!(f, "{failure}"),
            Self::Cancelled { reason } => write!(f, "Cancelled: {reason}"),
        }
    }
}

/// One end-to-end execution of the pipeline for a single transaction.
///
/// Results are append-only and kept in execution order. Once the run is
/// finalized (completed or aborted) every mutating call fails with
/// [`RunStateError::Frozen`].
#[derive(Debug, Clone, Serialize)]
pub struct PipelineRun {
    run_id: Uuid,
    created_at: DateTime<Utc>,
    transaction: Transaction,
    results: Vec<StageResult>,
    status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    abort_reason: Option<AbortReason>,
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<Decision>,
}

impl PipelineRun {
    /// Creates a pending run with a fresh run id.
    #[must_use]
    pub fn new(transaction: Transaction) -> Self {
        Self::with_run_id(Uuid::new_v4(), transaction)
    }

    /// Creates a pending run with a specific run id.
    #[must_use]
    pub fn with_run_id(run_id: Uuid, transaction: Transaction) -> Self {
        Self {
            run_id,
            created_at: Utc::now(),
            transaction,
            results: Vec::new(),
            status: RunStatus::Pending,
            abort_reason: None,
            decision: None,
        }
    }

    /// Returns the run id.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Returns the correlation id used on all telemetry for this run.
    #[must_use]
    pub fn correlation_id(&self) -> String {
        self.run_id.to_string()
    }

    /// Returns when the run was created.
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the originating transaction.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Returns the recorded stage results in execution order.
    #[must_use]
    pub fn results(&self) -> &[StageResult] {
        &self.results
    }

    /// Returns the result with the given sequence number.
    #[must_use]
    pub fn result(&self, sequence: usize) -> Option<&StageResult> {
        self.results.get(sequence)
    }

    /// Returns the most recent result recorded by the named stage.
    #[must_use]
    pub fn result_named(&self, stage: &str) -> Option<&StageResult> {
        self.results.iter().rev().find(|r| r.stage == stage)
    }

    /// Returns the most recent successful result carrying `key` in its payload.
    #[must_use]
    pub fn latest_with(&self, key: &str) -> Option<&StageResult> {
        self.results
            .iter()
            .rev()
            .find(|r| r.is_success() && r.payload.contains_key(key))
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        self.status
    }

    /// Returns the abort reason, if the run aborted.
    #[must_use]
    pub fn abort_reason(&self) -> Option<&AbortReason> {
        self.abort_reason.as_ref()
    }

    /// Returns the final decision, if one was made.
    #[must_use]
    pub fn decision(&self) -> Option<&Decision> {
        self.decision.as_ref()
    }

    /// Returns true once the run is completed or aborted.
    #[must_use]
    pub fn is_finalized(&self) -> bool {
        self.status.is_terminal()
    }

    /// Moves the run from `Pending` to `Running`.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is not pending.
    pub fn start(&mut self) -> Result<(), RunStateError> {
        self.ensure_open()?;
        self.status = self.status.transition(RunStatus::Running)?;
        Ok(())
    }

    /// Appends a stage result.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is not running or the sequence number
    /// does not immediately follow the last recorded result.
    pub fn append(&mut self, result: StageResult) -> Result<(), RunStateError> {
        self.ensure_open()?;
        if self.status != RunStatus::Running {
            return Err(RunStateError::IllegalTransition {
                from: self.status.to_string(),
                to: "append".to_string(),
            });
        }
        let expected = self.results.len();
        if result.sequence != expected {
            return Err(RunStateError::OutOfOrder {
                expected,
                actual: result.sequence,
            });
        }
        self.results.push(result);
        Ok(())
    }

    /// Finalizes the run as completed with a decision.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is not running.
    pub fn complete(&mut self, decision: Decision) -> Result<(), RunStateError> {
        self.ensure_open()?;
        self.status = self.status.transition(RunStatus::Completed)?;
        self.decision = Some(decision);
        Ok(())
    }

    /// Finalizes the run as aborted with an optional fallback decision.
    ///
    /// # Errors
    ///
    /// Returns an error if the run is already finalized.
    pub fn abort(&mut self, reason: AbortReason, fallback: Option<Decision>) -> Result<(), RunStateError> {
        self.ensure_open()?;
        self.status = self.status.transition(RunStatus::Aborted)?;
        self.abort_reason = Some(reason);
        self.decision = fallback;
        Ok(())
    }

    /// Converts an aborted-by-fatal run into an error, passing everything
    /// else through.
    ///
    /// # Errors
    ///
    /// Returns [`FraudflowError::Fatal`] if a stage aborted the run.
    pub fn into_result(self) -> Result<Self, FraudflowError> {
        if let Some(AbortReason::Fatal(failure)) = &self.abort_reason {
            return Err(failure.clone().into());
        }
        Ok(self)
    }

    fn ensure_open(&self) -> Result<(), RunStateError> {
        if self.is_finalized() {
            return Err(RunStateError::Frozen {
                run_id: self.run_id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Outcome, ReasonCode};
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;

    fn running_run() -> PipelineRun {
        let mut run = PipelineRun::new(Transaction::new("TX1", "C1", 10.0));
        run.start().unwrap();
        run
    }

    fn ok(stage: &str, seq: usize) -> StageResult {
        StageResult::success(stage, seq, HashMap::new(), BTreeMap::new(), Duration::ZERO)
    }

    #[test]
    fn test_new_run_is_pending() {
        let run = PipelineRun::new(Transaction::new("TX1", "C1", 10.0));
        assert_eq!(run.status(), RunStatus::Pending);
        assert!(run.results().is_empty());
        assert_eq!(run.correlation_id(), run.run_id().to_string());
    }

    #[test]
    fn test_append_requires_running() {
        let mut run = PipelineRun::new(Transaction::new("TX1", "C1", 10.0));
        assert!(run.append(ok("a", 0)).is_err());
    }

    #[test]
    fn test_append_in_order() {
        let mut run = running_run();
        run.append(ok("a", 0)).unwrap();
        run.append(ok("b", 1)).unwrap();

        let names: Vec<_> = run.results().iter().map(|r| r.stage.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_append_rejects_gap() {
        let mut run = running_run();
        let err = run.append(ok("a", 1)).unwrap_err();
        assert_eq!(err, RunStateError::OutOfOrder { expected: 0, actual: 1 });
    }

    #[test]
    fn test_completed_run_is_frozen() {
        let mut run = running_run();
        run.append(ok("a", 0)).unwrap();
        run.complete(Decision::new(Outcome::Approved, ReasonCode::RiskBelowThresholds, vec![0]))
            .unwrap();

        assert!(matches!(run.append(ok("b", 1)), Err(RunStateError::Frozen { .. })));
        assert!(run.abort(AbortReason::Cancelled { reason: "late".into() }, None).is_err());
        assert_eq!(run.results().len(), 1);
    }

    #[test]
    fn test_into_result_surfaces_fatal() {
        let mut run = running_run();
        run.abort(AbortReason::Fatal(FatalFailure::new("customer_data", "unknown")), None)
            .unwrap();

        assert!(matches!(run.into_result(), Err(FraudflowError::Fatal(_))));
    }

    #[test]
    fn test_latest_with_skips_failures() {
        let mut run = running_run();
        let mut payload = HashMap::new();
        payload.insert("risk_score".to_string(), serde_json::json!(0.3));
        run.append(StageResult::success("risk", 0, payload, BTreeMap::new(), Duration::ZERO))
            .unwrap();
        run.append(StageResult::failed("risk_v2", 1, "timeout", Duration::ZERO))
            .unwrap();

        assert_eq!(run.latest_with("risk_score").map(|r| r.sequence), Some(0));
        assert_eq!(run.result_named("risk_v2").map(|r| r.sequence), Some(1));
    }
}
