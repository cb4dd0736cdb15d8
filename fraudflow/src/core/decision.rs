//! Final classification of a transaction.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The outcome of a fraud decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Transaction may proceed.
    Approved,
    /// Transaction needs manual review or step-up authentication.
    Investigate,
    /// Transaction is declined.
    Blocked,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Approved => write!(f, "approved"),
            Self::Investigate => write!(f, "investigate"),
            Self::Blocked => write!(f, "blocked"),
        }
    }
}

/// Why a decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Risk score at or above the block threshold.
    RiskAboveBlockThreshold,
    /// Risk score at or above the investigate threshold.
    RiskAboveInvestigateThreshold,
    /// Risk score below both thresholds.
    RiskBelowThresholds,
    /// No stage produced a usable risk score.
    RiskScoreUnavailable,
    /// The run aborted and the fallback decision applied.
    RunAborted,
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RiskAboveBlockThreshold => "risk_above_block_threshold",
            Self::RiskAboveInvestigateThreshold => "risk_above_investigate_threshold",
            Self::RiskBelowThresholds => "risk_below_thresholds",
            Self::RiskScoreUnavailable => "risk_score_unavailable",
            Self::RunAborted => "run_aborted",
        };
        f.write_str(s)
    }
}

/// The pipeline's final classification of a transaction.
///
/// `contributing` holds sequence numbers of stage results inside the
/// owning run rather than copies of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// The outcome.
    pub outcome: Outcome,
    /// Why the outcome was chosen.
    pub reason_code: ReasonCode,
    /// Sequence numbers of the stage results that drove the decision.
    pub contributing: Vec<usize>,
    /// The risk score the decision was based on, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
}

impl Decision {
    /// Creates a new decision.
    #[must_use]
    pub fn new(outcome: Outcome, reason_code: ReasonCode, contributing: Vec<usize>) -> Self {
        Self {
            outcome,
            reason_code,
            contributing,
            risk_score: None,
        }
    }

    /// Sets the risk score.
    #[must_use]
    pub fn with_risk_score(mut self, score: f64) -> Self {
        self.risk_score = Some(score);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialize() {
        assert_eq!(serde_json::to_string(&Outcome::Investigate).unwrap(), r#""investigate""#);
        assert_eq!(Outcome::Blocked.to_string(), "blocked");
    }

    #[test]
    fn test_reason_code_display_matches_serde() {
        for code in [
            ReasonCode::RiskAboveBlockThreshold,
            ReasonCode::RiskAboveInvestigateThreshold,
            ReasonCode::RiskBelowThresholds,
            ReasonCode::RiskScoreUnavailable,
            ReasonCode::RunAborted,
        ] {
            let json = serde_json::to_value(code).unwrap();
            assert_eq!(json, serde_json::json!(code.to_string()));
        }
    }
}
