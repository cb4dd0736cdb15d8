//! Stage and run status enums.

use crate::errors::RunStateError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The recorded status of one stage in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage produced a meaningful result.
    Success,
    /// Stage could not produce a result; the run continued.
    Failed,
    /// Stage did not run (disabled or nothing to do).
    Skipped,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

/// Lifecycle of a pipeline run.
///
/// `Pending -> Running -> {Completed, Aborted}`. `Pending -> Aborted` is
/// allowed for runs cancelled before the first stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Run created, no stage executed.
    #[default]
    Pending,
    /// Stages are executing.
    Running,
    /// Every configured stage appended a result.
    Completed,
    /// A fatal failure or cancellation stopped the run.
    Aborted,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

impl RunStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted)
    }

    /// Validates and returns the next status.
    ///
    /// # Errors
    ///
    /// Returns [`RunStateError::IllegalTransition`] for any edge outside the
    /// state machine.
    pub fn transition(self, to: Self) -> Result<Self, RunStateError> {
        match (self, to) {
            (Self::Pending, Self::Running)
            | (Self::Pending | Self::Running, Self::Aborted)
            | (Self::Running, Self::Completed) => Ok(to),
            _ => Err(RunStateError::IllegalTransition {
                from: self.to_string(),
                to: to.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Success.to_string(), "success");
        assert_eq!(StageStatus::Failed.to_string(), "failed");
        assert_eq!(StageStatus::Skipped.to_string(), "skipped");
    }

    #[test]
    fn test_stage_status_serialize() {
        let json = serde_json::to_string(&StageStatus::Skipped).unwrap();
        assert_eq!(json, r#""skipped""#);
    }

    #[test]
    fn test_run_status_legal_transitions() {
        assert_eq!(RunStatus::Pending.transition(RunStatus::Running), Ok(RunStatus::Running));
        assert_eq!(RunStatus::Running.transition(RunStatus::Completed), Ok(RunStatus::Completed));
        assert_eq!(RunStatus::Running.transition(RunStatus::Aborted), Ok(RunStatus::Aborted));
        assert_eq!(RunStatus::Pending.transition(RunStatus::Aborted), Ok(RunStatus::Aborted));
    }

    #[test]
    fn test_run_status_illegal_transitions() {
        assert!(RunStatus::Pending.transition(RunStatus::Completed).is_err());
        assert!(RunStatus::Completed.transition(RunStatus::Running).is_err());
        assert!(RunStatus::Aborted.transition(RunStatus::Completed).is_err());
        assert!(RunStatus::Running.transition(RunStatus::Running).is_err());
    }

    #[test]
    fn test_run_status_terminal() {
        assert!(RunStatus::Completed.is_terminal());
        assert!(RunStatus::Aborted.is_terminal());
        assert!(!RunStatus::Running.is_terminal());
    }
}
