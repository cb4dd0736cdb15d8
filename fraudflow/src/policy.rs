//! Final classification of a pipeline run.

use crate::core::{Decision, Outcome, PipelineRun, ReasonCode};
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};

/// Maps the run's risk score onto approved, investigate or blocked.
///
/// Thresholds are validated once at construction and never adjusted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DecisionPolicy {
    block_threshold: f64,
    investigate_threshold: f64,
}

impl DecisionPolicy {
    /// Creates a policy.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] with code `CONFIG-004-THRESHOLDS` unless
    /// `0 <= investigate < block <= 1`.
    pub fn new(block_threshold: f64, investigate_threshold: f64) -> Result<Self, ConfigError> {
        let valid = investigate_threshold >= 0.0 && investigate_threshold < block_threshold && block_threshold <= 1.0;
        if !valid {
            return Err(ConfigError::thresholds(block_threshold, investigate_threshold));
        }
        Ok(Self {
            block_threshold,
            investigate_threshold,
        })
    }

    /// Returns the block threshold.
    #[must_use]
    pub fn block_threshold(&self) -> f64 {
        self.block_threshold
    }

    /// Returns the investigate threshold.
    #[must_use]
    pub fn investigate_threshold(&self) -> f64 {
        self.investigate_threshold
    }

    /// Classifies a score. Ties go to the stricter outcome.
    #[must_use]
    pub fn classify(&self, score: f64) -> (Outcome, ReasonCode) {
        if score >= self.block_threshold {
            (Outcome::Blocked, ReasonCode::RiskAboveBlockThreshold)
        } else if score >= self.investigate_threshold {
            (Outcome::Investigate, ReasonCode::RiskAboveInvestigateThreshold)
        } else {
            (Outcome::Approved, ReasonCode::RiskBelowThresholds)
        }
    }

    /// Decides a run from its recorded results.
    ///
    /// Uses the `risk_score` of the last successful stage that reported
    /// one. Without a usable score the run goes to investigation.
    /// `contributing` lists the scoring stage and every failed stage.
    #[must_use]
    pub fn decide(&self, run: &PipelineRun) -> Decision {
        let scored = run
            .latest_with("risk_score")
            .and_then(|r| r.get_f64("risk_score").filter(|s| s.is_finite()).map(|s| (r.sequence, s)));

        let mut contributing: Vec<usize> = run
            .results()
            .iter()
            .filter(|r| r.is_failure())
            .map(|r| r.sequence)
            .collect();

        match scored {
            Some((sequence, score)) => {
                let score = score.clamp(0.0, 1.0);
                contributing.push(sequence);
                contributing.sort_unstable();
                let (outcome, reason) = self.classify(score);
                Decision::new(outcome, reason, contributing).with_risk_score(score)
            }
            None => Decision::new(Outcome::Investigate, ReasonCode::RiskScoreUnavailable, contributing),
        }
    }
}

/// What an aborted run is decided as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbortFallback {
    /// Block the transaction with reason `run_aborted`.
    #[default]
    Block,
    /// Leave the run without a decision.
    None,
}

impl AbortFallback {
    /// Returns the fallback decision for an aborted run.
    #[must_use]
    pub fn decision(self, run: &PipelineRun) -> Option<Decision> {
        match self {
            Self::Block => {
                let contributing = run
                    .results()
                    .iter()
                    .filter(|r| r.is_failure())
                    .map(|r| r.sequence)
                    .collect();
                Some(Decision::new(Outcome::Blocked, ReasonCode::RunAborted, contributing))
            }
            Self::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{StageResult, Transaction};
    use pretty_assertions::assert_eq;
    use std::collections::{BTreeMap, HashMap};
    use std::time::Duration;

    fn run_with(results: Vec<StageResult>) -> PipelineRun {
        let mut run = PipelineRun::new(Transaction::new("tx-1", "cust-1", 100.0));
        run.start().unwrap();
        for result in results {
            run.append(result).unwrap();
        }
        run
    }

    fn scored(sequence: usize, score: f64) -> StageResult {
        let mut payload = HashMap::new();
        payload.insert("risk_score".to_string(), serde_json::json!(score));
        StageResult::success("risk_analysis", sequence, payload, BTreeMap::new(), Duration::ZERO)
    }

    fn empty(sequence: usize) -> StageResult {
        StageResult::success("customer_data", sequence, HashMap::new(), BTreeMap::new(), Duration::ZERO)
    }

    #[test]
    fn test_threshold_validation() {
        assert!(DecisionPolicy::new(0.9, 0.5).is_ok());
        assert!(DecisionPolicy::new(1.0, 0.0).is_ok());

        for (block, investigate) in [(0.5, 0.5), (0.5, 0.9), (1.1, 0.5), (0.9, -0.1), (f64::NAN, 0.5)] {
            let err = DecisionPolicy::new(block, investigate).unwrap_err();
            assert_eq!(err.code, ConfigError::THRESHOLDS);
        }
    }

    #[test]
    fn test_classify_ties_go_stricter() {
        let policy = DecisionPolicy::new(0.9, 0.5).unwrap();
        assert_eq!(policy.classify(0.9).0, Outcome::Blocked);
        assert_eq!(policy.classify(0.5).0, Outcome::Investigate);
        assert_eq!(policy.classify(0.4999).0, Outcome::Approved);
    }

    #[test]
    fn test_decide_block() {
        let policy = DecisionPolicy::new(0.9, 0.5).unwrap();
        let decision = policy.decide(&run_with(vec![empty(0), scored(1, 0.92)]));

        assert_eq!(decision.outcome, Outcome::Blocked);
        assert_eq!(decision.reason_code, ReasonCode::RiskAboveBlockThreshold);
        assert_eq!(decision.contributing, vec![1]);
        assert_eq!(decision.risk_score, Some(0.92));
    }

    #[test]
    fn test_decide_uses_latest_score() {
        let policy = DecisionPolicy::new(0.9, 0.5).unwrap();
        let decision = policy.decide(&run_with(vec![scored(0, 0.95), scored(1, 0.1)]));
        assert_eq!(decision.outcome, Outcome::Approved);
        assert_eq!(decision.contributing, vec![1]);
    }

    #[test]
    fn test_decide_without_score_investigates() {
        let policy = DecisionPolicy::new(0.9, 0.5).unwrap();
        let failed = StageResult::failed("risk_analysis", 1, "provider down", Duration::ZERO);
        let decision = policy.decide(&run_with(vec![empty(0), failed]));

        assert_eq!(decision.outcome, Outcome::Investigate);
        assert_eq!(decision.reason_code, ReasonCode::RiskScoreUnavailable);
        assert_eq!(decision.contributing, vec![1]);
        assert_eq!(decision.risk_score, None);
    }

    #[test]
    fn test_decide_is_deterministic() {
        let policy = DecisionPolicy::new(0.8, 0.3).unwrap();
        let run = run_with(vec![empty(0), scored(1, 0.42)]);
        assert_eq!(policy.decide(&run), policy.decide(&run));
    }

    #[test]
    fn test_abort_fallback() {
        let run = run_with(vec![empty(0)]);
        let decision = AbortFallback::Block.decision(&run).unwrap();
        assert_eq!(decision.outcome, Outcome::Blocked);
        assert_eq!(decision.reason_code, ReasonCode::RunAborted);
        assert_eq!(AbortFallback::None.decision(&run), None);
        assert_eq!(AbortFallback::default(), AbortFallback::Block);
    }
}
