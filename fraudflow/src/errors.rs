//! Error types for the fraudflow pipeline.
//!
//! Only [`ConfigError`] and [`FatalFailure`] surface as pipeline-level
//! failures. Non-fatal stage failures are captured as data on the
//! [`StageResult`](crate::core::StageResult), and [`TelemetryError`]s are
//! logged and counted by the emitter but never returned to pipeline code.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// The main error type for fraudflow operations.
#[derive(Debug, Error)]
pub enum FraudflowError {
    /// Invalid configuration detected at startup.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A stage declared that the run cannot continue.
    #[error("{0}")]
    Fatal(#[from] FatalFailure),

    /// An illegal mutation of a pipeline run was attempted.
    #[error("{0}")]
    RunState(#[from] RunStateError),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A decision request was malformed or failed validation.
    #[error("{0}")]
    Request(#[from] RequestError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias using [`FraudflowError`].
pub type Result<T> = std::result::Result<T, FraudflowError>;

/// Error raised when pipeline or policy configuration is invalid.
///
/// Carries a stable code so operators can match on it in startup logs.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("[{code}] {message}")]
pub struct ConfigError {
    /// Error code (e.g., "CONFIG-004-THRESHOLDS").
    pub code: String,
    /// Human readable message.
    pub message: String,
    /// Hint for fixing the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Additional context key-value pairs.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub context: HashMap<String, String>,
}

impl ConfigError {
    /// Code for an empty stage ordering.
    pub const EMPTY: &'static str = "CONFIG-001-EMPTY";
    /// Code for a stage listed twice.
    pub const DUPLICATE: &'static str = "CONFIG-002-DUPLICATE";
    /// Code for a stage name with no registered implementation.
    pub const UNKNOWN_STAGE: &'static str = "CONFIG-003-UNKNOWN_STAGE";
    /// Code for invalid decision thresholds.
    pub const THRESHOLDS: &'static str = "CONFIG-004-THRESHOLDS";
    /// Code for an invalid timeout.
    pub const TIMEOUT: &'static str = "CONFIG-005-TIMEOUT";
    /// Code for invalid telemetry settings.
    pub const TELEMETRY: &'static str = "CONFIG-006-TELEMETRY";
    /// Code for an unreadable configuration source.
    pub const SOURCE: &'static str = "CONFIG-007-SOURCE";

    /// Creates a new configuration error.
    #[must_use]
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            fix_hint: None,
            context: HashMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Error for `block <= investigate` or thresholds outside `[0, 1]`.
    #[must_use]
    pub fn thresholds(block: f64, investigate: f64) -> Self {
        Self::new(
            Self::THRESHOLDS,
            format!(
                "Invalid decision thresholds: block={block}, investigate={investigate}; \
                 require 0 <= investigate < block <= 1"
            ),
        )
        .with_fix_hint("Set the block threshold strictly above the investigate threshold.")
        .with_context_entry("block_threshold", block.to_string())
        .with_context_entry("investigate_threshold", investigate.to_string())
    }
}

/// A stage determined that the run cannot safely continue.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Fatal failure in stage '{stage}': {reason}")]
pub struct FatalFailure {
    /// The stage that aborted the run.
    pub stage: String,
    /// Why the run was aborted.
    pub reason: String,
}

impl FatalFailure {
    /// Creates a new fatal failure.
    #[must_use]
    pub fn new(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

/// Error raised when a run is mutated outside its state machine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunStateError {
    /// The run has been finalized and no longer accepts changes.
    #[error("Run {run_id} is finalized and cannot be modified")]
    Frozen {
        /// The run identifier.
        run_id: String,
    },

    /// The requested status transition is not allowed.
    #[error("Illegal run transition {from} -> {to}")]
    IllegalTransition {
        /// Current status.
        from: String,
        /// Requested status.
        to: String,
    },

    /// A result was appended with a sequence number that leaves a gap.
    #[error("Out of order stage result: expected sequence {expected}, got {actual}")]
    OutOfOrder {
        /// The next sequence number the run expects.
        expected: usize,
        /// The sequence number supplied.
        actual: usize,
    },
}

/// Failures emitting or exporting telemetry.
///
/// These are reported through `tracing` and the emitter's counters only.
#[derive(Debug, Clone, Error)]
pub enum TelemetryError {
    /// The export queue was full and the event was dropped.
    #[error("Telemetry queue full (capacity {capacity}), dropped '{event}'")]
    QueueFull {
        /// Queue capacity.
        capacity: usize,
        /// Name of the dropped event.
        event: String,
    },

    /// The exporter has shut down.
    #[error("Telemetry queue closed, dropped '{event}'")]
    QueueClosed {
        /// Name of the dropped event.
        event: String,
    },

    /// The backend rejected or failed to receive a batch.
    #[error("Telemetry export failed: {0}")]
    Export(String),

    /// An event could not be serialized.
    #[error("Telemetry serialization failed: {0}")]
    Serialize(String),
}

/// Failures from a reasoning provider.
///
/// Stages turn these into non-fatal stage failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReasoningError {
    /// The provider could not be reached or refused the request.
    #[error("Reasoning provider unavailable: {0}")]
    Unavailable(String),

    /// The provider answered with something unusable.
    #[error("Invalid reasoning response: {0}")]
    InvalidResponse(String),
}

/// Failures looking up customer data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DirectoryError {
    /// The backing store could not be queried.
    #[error("Customer directory unavailable: {0}")]
    Unavailable(String),

    /// A stored profile could not be decoded.
    #[error("Corrupt customer record '{customer_id}': {message}")]
    Corrupt {
        /// Customer whose record is broken.
        customer_id: String,
        /// Decoder message.
        message: String,
    },
}

/// A decision request that cannot be turned into a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    /// The body is not valid request JSON.
    #[error("Malformed request: {0}")]
    Malformed(String),

    /// A field failed validation.
    #[error("Invalid field '{field}': {message}")]
    Invalid {
        /// Field name as it appears on the wire.
        field: &'static str,
        /// What is wrong with it.
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::new(ConfigError::EMPTY, "Pipeline has no stages")
            .with_fix_hint("Add a stage");

        assert_eq!(err.to_string(), "[CONFIG-001-EMPTY] Pipeline has no stages");
        assert_eq!(err.fix_hint.as_deref(), Some("Add a stage"));
    }

    #[test]
    fn test_threshold_error_context() {
        let err = ConfigError::thresholds(0.5, 0.9);
        assert_eq!(err.code, ConfigError::THRESHOLDS);
        assert_eq!(err.context.get("block_threshold"), Some(&"0.5".to_string()));
    }

    #[test]
    fn test_fatal_failure_into_umbrella() {
        let err: FraudflowError = FatalFailure::new("customer_data", "unknown customer").into();
        assert!(matches!(err, FraudflowError::Fatal(_)));
        assert!(err.to_string().contains("customer_data"));
    }

    #[test]
    fn test_run_state_error_display() {
        let err = RunStateError::OutOfOrder {
            expected: 2,
            actual: 3,
        };
        assert!(err.to_string().contains("expected sequence 2"));
    }

    #[test]
    fn test_telemetry_error_display() {
        let err = TelemetryError::QueueFull {
            capacity: 8,
            event: "span_start".to_string(),
        };
        assert!(err.to_string().contains("capacity 8"));
    }
}
