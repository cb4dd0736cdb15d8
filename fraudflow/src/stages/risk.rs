//! Risk scoring stage.

use super::{PipelineStage, ReasoningProvider, StageContext};
use crate::core::{StageOutcome, StageResult, Transaction};
use crate::telemetry::{attributes, names};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Score patterns, most specific first. Each captures a 0-100 value.
static SCORE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"risk\s*score[:\s]*(\d{1,3})(?:\s*/\s*100)?",
        r"score[:\s]*(\d{1,3})\s*/\s*100",
        r"(\d{1,3})\s*(?:out of|/)\s*100",
        r"\*\*risk[:\s]*(\d{1,3})\*\*",
        r"overall\s*risk[:\s]*(\d{1,3})",
        r"assessment[:\s]*(\d{1,3})",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static HIGH_WORDS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b(high|critical|severe)\b").ok());
static MEDIUM_WORDS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b(medium|moderate)\b").ok());
static LOW_WORDS: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\b(low|minimal)\b").ok());

/// Extracts a 0-100 risk score from free-form analysis text.
///
/// Explicit numeric scores win; otherwise risk keywords map to 85, 55 or
/// 25, and text with neither yields 50.
#[must_use]
pub fn parse_risk_score(text: &str) -> u8 {
    let lowered = text.to_lowercase();

    for pattern in SCORE_PATTERNS.iter() {
        let score = pattern
            .captures(&lowered)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u8>().ok())
            .filter(|s| *s <= 100);
        if let Some(score) = score {
            return score;
        }
    }

    let mentions = |words: &LazyLock<Option<Regex>>| words.as_ref().is_some_and(|re| re.is_match(&lowered));
    if mentions(&HIGH_WORDS) {
        85
    } else if mentions(&MEDIUM_WORDS) {
        55
    } else if mentions(&LOW_WORDS) {
        25
    } else {
        50
    }
}

/// Deterministic score from customer features and transaction flags.
///
/// Reads `amount_ratio`, `account_age_days` and `currency_match` from the
/// customer result and the boolean payload flags `new_device`,
/// `high_risk_merchant` and `card_present` from the transaction.
#[must_use]
pub fn rule_score(customer: &StageResult, transaction: &Transaction) -> f64 {
    let mut score: f64 = 0.05;

    let ratio = customer.get_f64("amount_ratio").unwrap_or(1.0);
    score += if ratio >= 10.0 {
        0.45
    } else if ratio >= 5.0 {
        0.35
    } else if ratio >= 2.0 {
        0.15
    } else {
        0.0
    };

    match customer.get_f64("account_age_days") {
        Some(age) if age < 30.0 => score += 0.20,
        Some(age) if age < 90.0 => score += 0.10,
        _ => {}
    }

    if customer.get("currency_match").and_then(serde_json::Value::as_bool) == Some(false) {
        score += 0.15;
    }

    let flag = |key: &str| transaction.payload().get(key).and_then(serde_json::Value::as_bool);
    if flag("new_device") == Some(true) {
        score += 0.10;
    }
    if flag("high_risk_merchant") == Some(true) {
        score += 0.15;
    }
    if flag("card_present") == Some(false) {
        score += 0.05;
    }

    score.clamp(0.0, 1.0)
}

/// Coarse risk band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    /// Below 0.40.
    Low,
    /// From 0.40.
    Medium,
    /// From 0.75.
    High,
}

impl RiskLevel {
    /// Bands a score in `[0, 1]`.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.75 {
            Self::High
        } else if score >= 0.40 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Returns the recommendation for this band.
    #[must_use]
    pub fn recommendation(self) -> Recommendation {
        match self {
            Self::High => Recommendation::Block,
            Self::Medium => Recommendation::Investigate,
            Self::Low => Recommendation::Allow,
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the risk stage suggests doing with the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    /// Let it through.
    Allow,
    /// Hold for review.
    Investigate,
    /// Decline.
    Block,
}

impl Recommendation {
    /// Returns the wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Investigate => "INVESTIGATE",
            Self::Block => "BLOCK",
        }
    }

    fn friction(self) -> Option<&'static str> {
        match self {
            Self::Block => Some("transaction_declined"),
            Self::Investigate => Some("step_up_authentication"),
            Self::Allow => None,
        }
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Scores the transaction using the customer features recorded before it.
///
/// With a reasoning provider the score is parsed out of the provider's
/// analysis; without one the deterministic [`rule_score`] is used.
#[derive(Debug, Clone)]
pub struct RiskAnalysisStage {
    name: String,
    reasoning: Option<Arc<dyn ReasoningProvider>>,
}

impl Default for RiskAnalysisStage {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskAnalysisStage {
    /// Default stage name.
    pub const NAME: &'static str = "risk_analysis";

    /// Creates a rule-based risk stage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: Self::NAME.to_string(),
            reasoning: None,
        }
    }

    /// Overrides the stage name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Scores from a reasoning provider's analysis instead of rules.
    #[must_use]
    pub fn with_reasoning(mut self, provider: Arc<dyn ReasoningProvider>) -> Self {
        self.reasoning = Some(provider);
        self
    }

    fn prompt(customer: &StageResult, tx: &Transaction) -> String {
        let analysis = customer.get_str("analysis").unwrap_or("no narrative analysis available");
        format!(
            "Based on this customer data analysis, perform a comprehensive risk assessment:\n\n\
             {analysis}\n\n\
             Transaction {} for customer {}: {:.2} {}. Amount ratio {:.2}, account age {} days, \
             currency match {}.\n\n\
             Provide a complete risk assessment with score (0-100), level (LOW/MEDIUM/HIGH) and \
             recommendation (ALLOW/INVESTIGATE/BLOCK).",
            tx.transaction_id(),
            tx.customer_id(),
            tx.amount(),
            tx.currency(),
            customer.get_f64("amount_ratio").unwrap_or(1.0),
            customer.get("account_age_days").cloned().unwrap_or_default(),
            customer.get("currency_match").cloned().unwrap_or_default(),
        )
    }
}

#[async_trait]
impl PipelineStage for RiskAnalysisStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> StageOutcome {
        let tx = ctx.transaction();
        let Some(customer) = ctx.latest_with("customer_known") else {
            return StageOutcome::fail("customer data unavailable");
        };

        ctx.record_event(
            &names::stage_event("risk_analysis", "started"),
            attributes(serde_json::json!({
                "transaction_id": tx.transaction_id(),
                "customer_id": tx.customer_id(),
            })),
        );

        let mut payload: HashMap<String, serde_json::Value> = HashMap::new();
        let score = match &self.reasoning {
            Some(provider) => match provider.reason(&Self::prompt(customer, tx)).await {
                Ok(response) => {
                    let parsed = parse_risk_score(&response.content);
                    payload.insert("risk_analysis".to_string(), serde_json::json!(response.content));
                    payload.insert("score_source".to_string(), serde_json::json!("reasoning"));
                    f64::from(parsed) / 100.0
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Risk analysis unavailable");
                    return StageOutcome::fail(e.to_string());
                }
            },
            None => {
                payload.insert("score_source".to_string(), serde_json::json!("rules"));
                rule_score(customer, tx)
            }
        };

        let level = RiskLevel::from_score(score);
        let recommendation = level.recommendation();
        let confidence = (score - 0.5).abs() / 0.5;

        payload.insert("risk_score".to_string(), serde_json::json!(score));
        payload.insert("risk_level".to_string(), serde_json::json!(level));
        payload.insert("recommendation".to_string(), serde_json::json!(recommendation));
        payload.insert("model_confidence".to_string(), serde_json::json!(confidence));
        payload.insert("amount".to_string(), serde_json::json!(tx.amount()));
        payload.insert("currency".to_string(), serde_json::json!(tx.currency()));

        ctx.record_metric(
            names::RISK_SCORE,
            score,
            attributes(serde_json::json!({"recommendation": recommendation.as_str()})),
        );
        ctx.record_metric(
            names::MODEL_CONFIDENCE,
            confidence,
            attributes(serde_json::json!({"prediction": level.as_str()})),
        );
        if let Some(friction) = recommendation.friction() {
            ctx.record_metric(
                names::CUSTOMER_FRICTION,
                1.0,
                attributes(serde_json::json!({"friction_type": friction})),
            );
        }
        ctx.record_event(
            &names::stage_event("risk_analysis", "completed"),
            attributes(serde_json::json!({
                "transaction_id": tx.transaction_id(),
                "risk_score": score,
                "risk_level": level.as_str(),
                "recommendation": recommendation.as_str(),
            })),
        );
        debug!(transaction_id = tx.transaction_id(), score, %level, "Risk scored");

        StageOutcome::ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::test_support::running_run;
    use crate::stages::StaticReasoningProvider;
    use crate::telemetry::InMemoryTelemetry;
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;
    use std::time::Duration;

    fn customer(ratio: f64, age: i64, currency_match: bool) -> serde_json::Value {
        serde_json::json!({
            "customer_known": true,
            "amount_ratio": ratio,
            "account_age_days": age,
            "currency_match": currency_match,
        })
    }

    async fn score_with(stage: &RiskAnalysisStage, tx: Transaction, prior: serde_json::Value) -> (StageOutcome, InMemoryTelemetry) {
        let run = running_run(tx, vec![("customer_data", prior)]);
        let telemetry = InMemoryTelemetry::new();
        let outcome = {
            let ctx = StageContext::new(&run, &telemetry, stage.name(), 1);
            stage.execute(&ctx).await
        };
        (outcome, telemetry)
    }

    #[test]
    fn test_parse_numeric_patterns() {
        assert_eq!(parse_risk_score("Risk Score: 75"), 75);
        assert_eq!(parse_risk_score("RISK SCORE: 92/100, block it"), 92);
        assert_eq!(parse_risk_score("Final score: 40 / 100"), 40);
        assert_eq!(parse_risk_score("I'd put this at 63 out of 100."), 63);
        assert_eq!(parse_risk_score("**Risk: 12**"), 12);
        assert_eq!(parse_risk_score("Overall risk: 88"), 88);
        assert_eq!(parse_risk_score("Assessment: 5"), 5);
    }

    #[test]
    fn test_parse_out_of_range_falls_through() {
        // 250 is rejected, the keyword fallback applies.
        assert_eq!(parse_risk_score("risk score: 250, looks low"), 25);
    }

    #[test]
    fn test_parse_keyword_fallback() {
        assert_eq!(parse_risk_score("This is a severe pattern"), 85);
        assert_eq!(parse_risk_score("Moderate concern"), 55);
        assert_eq!(parse_risk_score("minimal exposure"), 25);
        assert_eq!(parse_risk_score("nothing conclusive"), 50);
        assert_eq!(parse_risk_score("highway toll"), 50);
    }

    #[test]
    fn test_risk_level_bands() {
        assert_eq!(RiskLevel::from_score(0.75), RiskLevel::High);
        assert_eq!(RiskLevel::from_score(0.7499), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.40), RiskLevel::Medium);
        assert_eq!(RiskLevel::from_score(0.39), RiskLevel::Low);
        assert_eq!(RiskLevel::High.recommendation(), Recommendation::Block);
    }

    #[test]
    fn test_rule_score_components() {
        let mk = |payload: serde_json::Value| {
            let payload: HashMap<String, serde_json::Value> = serde_json::from_value(payload).unwrap();
            StageResult::success("customer_data", 0, payload, BTreeMap::new(), Duration::ZERO)
        };
        let tx = Transaction::new("tx", "c", 10.0);

        let calm = mk(customer(0.5, 900, true));
        assert!((rule_score(&calm, &tx) - 0.05).abs() < 1e-9);

        let hot = mk(customer(12.0, 3, false));
        let flagged = tx
            .clone()
            .with_payload_entry("new_device", serde_json::json!(true))
            .with_payload_entry("high_risk_merchant", serde_json::json!(true))
            .with_payload_entry("card_present", serde_json::json!(false));
        assert!((rule_score(&hot, &flagged) - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_rules_path_payload_and_metrics() {
        let stage = RiskAnalysisStage::new();
        let (outcome, telemetry) = score_with(&stage, Transaction::new("tx-1", "cust-1", 500.0), customer(6.0, 45, true)).await;

        let StageOutcome::Success { payload, .. } = outcome else {
            panic!("expected success");
        };
        // 0.05 + 0.35 (ratio) + 0.10 (age)
        let score = payload["risk_score"].as_f64().unwrap();
        assert!((score - 0.5).abs() < 1e-9);
        assert_eq!(payload["risk_level"], "MEDIUM");
        assert_eq!(payload["recommendation"], "INVESTIGATE");
        assert_eq!(payload["score_source"], "rules");
        assert_eq!(telemetry.metric_values(names::CUSTOMER_FRICTION), vec![1.0]);
        assert_eq!(telemetry.metric_values(names::RISK_SCORE).len(), 1);
    }

    #[tokio::test]
    async fn test_reasoning_path() {
        let stage = RiskAnalysisStage::new().with_reasoning(Arc::new(StaticReasoningProvider::always(
            "Risk Score: 92/100. Level HIGH. Recommendation: BLOCK",
        )));
        let (outcome, telemetry) = score_with(&stage, Transaction::new("tx-1", "cust-1", 50_000.0), customer(1.0, 900, true)).await;

        let StageOutcome::Success { payload, .. } = outcome else {
            panic!("expected success");
        };
        assert_eq!(payload["risk_score"], 0.92);
        assert_eq!(payload["risk_level"], "HIGH");
        assert_eq!(payload["recommendation"], "BLOCK");
        let confidence = payload["model_confidence"].as_f64().unwrap();
        assert!((confidence - 0.84).abs() < 1e-9);
        assert_eq!(telemetry.metric_values(names::RISK_SCORE), vec![0.92]);
    }

    #[tokio::test]
    async fn test_low_score_has_no_friction() {
        let stage = RiskAnalysisStage::new().with_reasoning(Arc::new(StaticReasoningProvider::always("risk score: 10")));
        let (_, telemetry) = score_with(&stage, Transaction::new("tx-1", "cust-1", 20.0), customer(0.2, 900, true)).await;
        assert!(telemetry.metric_values(names::CUSTOMER_FRICTION).is_empty());
    }

    #[tokio::test]
    async fn test_missing_customer_data_fails() {
        let stage = RiskAnalysisStage::new();
        let run = running_run(Transaction::new("tx-1", "cust-1", 1.0), vec![]);
        let telemetry = InMemoryTelemetry::new();
        let ctx = StageContext::new(&run, &telemetry, stage.name(), 0);

        let outcome = stage.execute(&ctx).await;
        assert_eq!(outcome, StageOutcome::fail("customer data unavailable"));
        assert!(telemetry.is_empty());
    }

    #[tokio::test]
    async fn test_provider_failure_is_non_fatal() {
        let stage = RiskAnalysisStage::new().with_reasoning(Arc::new(StaticReasoningProvider::failing("quota")));
        let (outcome, _) = score_with(&stage, Transaction::new("tx-1", "cust-1", 1.0), customer(1.0, 900, true)).await;
        assert_eq!(outcome.label(), "failed");
    }
}
