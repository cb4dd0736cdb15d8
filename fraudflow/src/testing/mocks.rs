//! Scripted stages for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

use crate::core::StageOutcome;
use crate::stages::{PipelineStage, StageContext};

/// What a [`RecordingStage`] saw when it was invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    /// Sequence number the pipeline assigned.
    pub sequence: usize,
    /// Results already in the run at call time.
    pub prior_results: usize,
    /// Correlation id of the run.
    pub correlation_id: String,
}

/// A stage that records each invocation and returns a configurable outcome.
#[derive(Debug)]
pub struct RecordingStage {
    name: String,
    outcome: Mutex<StageOutcome>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl RecordingStage {
    /// Creates a recording stage that succeeds with an empty payload.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            outcome: Mutex::new(StageOutcome::ok_empty()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the outcome returned from now on.
    #[must_use]
    pub fn returning(self, outcome: StageOutcome) -> Self {
        *self.outcome.lock() = outcome;
        self
    }

    /// Returns all recorded invocations.
    #[must_use]
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().clone()
    }

    /// Returns the number of invocations.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl PipelineStage for RecordingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> StageOutcome {
        self.calls.lock().push(RecordedCall {
            sequence: ctx.sequence(),
            prior_results: ctx.run().results().len(),
            correlation_id: ctx.correlation_id().to_string(),
        });
        self.outcome.lock().clone()
    }
}

/// A stage that always fails without stopping the run.
#[derive(Debug)]
pub struct FailingStage {
    name: String,
    reason: String,
}

impl FailingStage {
    /// Creates a new failing stage.
    #[must_use]
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PipelineStage for FailingStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext<'_>) -> StageOutcome {
        StageOutcome::fail(&self.reason)
    }
}

/// A stage that always aborts the run.
#[derive(Debug)]
pub struct FatalStage {
    name: String,
    reason: String,
}

impl FatalStage {
    /// Creates a new fatal stage.
    #[must_use]
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl PipelineStage for FatalStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext<'_>) -> StageOutcome {
        StageOutcome::fatal(&self.reason)
    }
}

/// A stage that sleeps before succeeding.
#[derive(Debug)]
pub struct SlowStage {
    name: String,
    delay: Duration,
}

impl SlowStage {
    /// Creates a new slow stage.
    #[must_use]
    pub fn new(name: impl Into<String>, delay: Duration) -> Self {
        Self {
            name: name.into(),
            delay,
        }
    }

    /// Creates a slow stage with delay in milliseconds.
    #[must_use]
    pub fn with_delay_ms(name: impl Into<String>, ms: u64) -> Self {
        Self::new(name, Duration::from_millis(ms))
    }
}

#[async_trait]
impl PipelineStage for SlowStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext<'_>) -> StageOutcome {
        tokio::time::sleep(self.delay).await;
        StageOutcome::ok_empty()
    }
}

/// A stage that reports a fixed `risk_score`.
#[derive(Debug)]
pub struct ScoreStage {
    name: String,
    score: f64,
}

impl ScoreStage {
    /// Creates a scoring stage.
    #[must_use]
    pub fn new(name: impl Into<String>, score: f64) -> Self {
        Self {
            name: name.into(),
            score,
        }
    }
}

#[async_trait]
impl PipelineStage for ScoreStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _ctx: &StageContext<'_>) -> StageOutcome {
        StageOutcome::ok_value("risk_score", serde_json::json!(self.score))
    }
}
