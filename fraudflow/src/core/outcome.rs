//! What a stage hands back to the pipeline.

use std::collections::{BTreeMap, HashMap};

/// The outcome of executing one stage.
///
/// The pipeline turns this into a [`StageResult`](super::StageResult) by
/// adding the stage name, sequence number and measured duration.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// The stage produced a result.
    Success {
        /// Stage specific output.
        payload: HashMap<String, serde_json::Value>,
        /// Metric values emitted while producing it.
        metrics: BTreeMap<String, f64>,
    },
    /// The stage could not produce a meaningful result; the run continues.
    Failed {
        /// Why the stage failed.
        reason: String,
    },
    /// The stage had nothing to do.
    Skipped {
        /// Why the stage was skipped.
        reason: String,
    },
    /// The run cannot safely continue.
    Fatal {
        /// Why the run must abort.
        reason: String,
    },
}

impl StageOutcome {
    /// Creates a successful outcome with a payload.
    #[must_use]
    pub fn ok(payload: HashMap<String, serde_json::Value>) -> Self {
        Self::Success {
            payload,
            metrics: BTreeMap::new(),
        }
    }

    /// Creates a successful outcome with no payload.
    #[must_use]
    pub fn ok_empty() -> Self {
        Self::ok(HashMap::new())
    }

    /// Creates a successful outcome with a single value.
    #[must_use]
    pub fn ok_value(key: impl Into<String>, value: serde_json::Value) -> Self {
        let mut payload = HashMap::new();
        payload.insert(key.into(), value);
        Self::ok(payload)
    }

    /// Creates a non-fatal failure.
    #[must_use]
    pub fn fail(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Creates a skip.
    #[must_use]
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Creates a fatal failure.
    #[must_use]
    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    /// Attaches a metric to a successful outcome. No-op for other variants.
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        if let Self::Success { metrics, .. } = &mut self {
            metrics.insert(name.into(), value);
        }
        self
    }

    /// Returns a short status label used in telemetry.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Failed { .. } => "failed",
            Self::Skipped { .. } => "skipped",
            Self::Fatal { .. } => "fatal",
        }
    }

    /// Returns true for [`StageOutcome::Fatal`].
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Fatal { .. })
    }

    /// Returns the failure/skip reason, if any.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failed { reason } | Self::Skipped { reason } | Self::Fatal { reason } => Some(reason),
        }
    }
}
