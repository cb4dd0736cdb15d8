//! Fraud alert and SAR filing stage.

use super::{PipelineStage, ReasoningProvider, StageContext};
use crate::core::StageOutcome;
use crate::telemetry::{attributes, names};
use async_trait::async_trait;
use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Alert severity derived from the risk score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Below 0.5.
    Low,
    /// From 0.5.
    Medium,
    /// From 0.75.
    High,
    /// From 0.9.
    Critical,
}

impl Severity {
    /// Bands a score in `[0, 1]`.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.9 {
            Self::Critical
        } else if score >= 0.75 {
            Self::High
        } else if score >= 0.5 {
            Self::Medium
        } else {
            Self::Low
        }
    }

    /// Returns the wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }

    /// Returns true when a suspicious activity report is required.
    #[must_use]
    pub fn requires_sar(self) -> bool {
        self >= Self::High
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Thresholds for [`FraudAlertStage`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertSettings {
    /// Minimum risk score that raises an alert.
    pub alert_threshold: f64,
    /// Amount at or above which an alerted transaction always gets a SAR.
    pub sar_amount_threshold: f64,
    /// Days until a filed SAR is due.
    pub sar_deadline_days: i64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            alert_threshold: 0.40,
            sar_amount_threshold: 10_000.0,
            sar_deadline_days: 30,
        }
    }
}

/// Raises alerts and files suspicious activity reports from the risk result.
///
/// Skips when no risk score was recorded earlier in the run.
#[derive(Debug, Clone)]
pub struct FraudAlertStage {
    name: String,
    settings: AlertSettings,
    reasoning: Option<Arc<dyn ReasoningProvider>>,
}

impl Default for FraudAlertStage {
    fn default() -> Self {
        Self::new()
    }
}

impl FraudAlertStage {
    /// Default stage name.
    pub const NAME: &'static str = "fraud_alert";

    /// Creates the stage with default thresholds.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: Self::NAME.to_string(),
            settings: AlertSettings::default(),
            reasoning: None,
        }
    }

    /// Overrides the stage name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Overrides the thresholds.
    #[must_use]
    pub fn with_settings(mut self, settings: AlertSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Lets a reasoning provider raise alerts below the score threshold.
    ///
    /// An alert is raised when the provider's answer contains
    /// "alert created".
    #[must_use]
    pub fn with_reasoning(mut self, provider: Arc<dyn ReasoningProvider>) -> Self {
        self.reasoning = Some(provider);
        self
    }
}

#[async_trait]
impl PipelineStage for FraudAlertStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> StageOutcome {
        let tx = ctx.transaction();
        let Some(risk) = ctx.latest_with("risk_score") else {
            return StageOutcome::skip("no risk assessment available");
        };
        let score = risk.get_f64("risk_score").unwrap_or(0.0);
        let recommendation = risk.get_str("recommendation").unwrap_or("ALLOW").to_string();

        ctx.record_event(
            &names::stage_event("fraud_alert", "started"),
            attributes(serde_json::json!({
                "transaction_id": tx.transaction_id(),
                "risk_score": score,
            })),
        );

        let severity = Severity::from_score(score);
        let mut alert_created = score >= self.settings.alert_threshold;

        if let Some(provider) = &self.reasoning {
            let prompt = format!(
                "Based on this risk analysis, determine if a fraud alert should be created.\n\n\
                 Transaction ID: {}\nCustomer ID: {}\nRisk Score: {:.0}/100\nRecommendation: {recommendation}\n\n\
                 If risk score >= {:.0}, create a fraud alert and answer 'alert created'. \
                 Otherwise explain why no alert is needed.",
                tx.transaction_id(),
                tx.customer_id(),
                score * 100.0,
                self.settings.alert_threshold * 100.0,
            );
            match provider.reason(&prompt).await {
                Ok(response) => alert_created |= response.content.to_lowercase().contains("alert created"),
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Alert review unavailable");
                    return StageOutcome::fail(e.to_string());
                }
            }
        }

        let mut payload: HashMap<String, serde_json::Value> = HashMap::new();
        payload.insert("alert_created".to_string(), serde_json::json!(alert_created));
        payload.insert(
            "severity".to_string(),
            serde_json::json!(if alert_created { severity.as_str() } else { "NONE" }),
        );
        payload.insert("sar_filed".to_string(), serde_json::json!(false));

        if alert_created {
            let alert_id = format!("ALERT-{}", tx.transaction_id());
            payload.insert("alert_id".to_string(), serde_json::json!(alert_id));
            ctx.record_metric(
                names::ALERTS_CREATED,
                1.0,
                attributes(serde_json::json!({
                    "alert_id": alert_id,
                    "severity": severity.as_str(),
                    "recommendation": recommendation,
                })),
            );

            if recommendation == "BLOCK" {
                ctx.record_metric(
                    names::FRAUD_PREVENTED_AMOUNT,
                    tx.amount(),
                    attributes(serde_json::json!({
                        "currency": tx.currency(),
                        "risk_score": score,
                    })),
                );
            }

            let amount_threshold_exceeded = tx.amount() >= self.settings.sar_amount_threshold;
            if severity.requires_sar() || amount_threshold_exceeded {
                let now = Utc::now();
                let hex = uuid::Uuid::new_v4().simple().to_string();
                let sar_id = format!("SAR-{}-{}", now.year(), hex[..8].to_uppercase());
                let deadline = (now + chrono::Duration::days(self.settings.sar_deadline_days))
                    .format("%Y-%m-%d")
                    .to_string();

                payload.insert("sar_filed".to_string(), serde_json::json!(true));
                payload.insert("sar_id".to_string(), serde_json::json!(sar_id));
                payload.insert("sar_deadline".to_string(), serde_json::json!(deadline));
                payload.insert(
                    "amount_threshold_exceeded".to_string(),
                    serde_json::json!(amount_threshold_exceeded),
                );
                ctx.record_metric(
                    names::SAR_FILED,
                    1.0,
                    attributes(serde_json::json!({
                        "sar_id": sar_id,
                        "filing_deadline": deadline,
                        "amount_threshold_exceeded": amount_threshold_exceeded,
                    })),
                );
                info!(transaction_id = tx.transaction_id(), %sar_id, "SAR filed");
            }
        }

        ctx.record_event(
            &names::stage_event("fraud_alert", "completed"),
            attributes(serde_json::json!({
                "transaction_id": tx.transaction_id(),
                "alert_created": alert_created,
                "severity": severity.as_str(),
            })),
        );

        StageOutcome::ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transaction;
    use crate::stages::test_support::running_run;
    use crate::stages::StaticReasoningProvider;
    use crate::telemetry::InMemoryTelemetry;

    async fn alert_for(
        stage: &FraudAlertStage,
        amount: f64,
        score: f64,
        recommendation: &str,
    ) -> (HashMap<String, serde_json::Value>, InMemoryTelemetry) {
        let run = running_run(
            Transaction::new("tx-77", "cust-1", amount),
            vec![
                ("customer_data", serde_json::json!({"customer_known": true})),
                (
                    "risk_analysis",
                    serde_json::json!({"risk_score": score, "recommendation": recommendation}),
                ),
            ],
        );
        let telemetry = InMemoryTelemetry::new();
        let outcome = {
            let ctx = StageContext::new(&run, &telemetry, stage.name(), 2);
            stage.execute(&ctx).await
        };
        let StageOutcome::Success { payload, .. } = outcome else {
            panic!("expected success, got {outcome:?}");
        };
        (payload, telemetry)
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(Severity::from_score(0.9), Severity::Critical);
        assert_eq!(Severity::from_score(0.75), Severity::High);
        assert_eq!(Severity::from_score(0.5), Severity::Medium);
        assert_eq!(Severity::from_score(0.49), Severity::Low);
        assert!(Severity::High.requires_sar());
        assert!(!Severity::Medium.requires_sar());
    }

    #[tokio::test]
    async fn test_critical_block_files_sar() {
        let (payload, telemetry) = alert_for(&FraudAlertStage::new(), 50_000.0, 0.92, "BLOCK").await;

        assert_eq!(payload["alert_created"], true);
        assert_eq!(payload["alert_id"], "ALERT-tx-77");
        assert_eq!(payload["severity"], "CRITICAL");
        assert_eq!(payload["sar_filed"], true);
        let sar_id = payload["sar_id"].as_str().unwrap();
        assert!(sar_id.starts_with(&format!("SAR-{}-", Utc::now().year())));
        assert_eq!(sar_id.rsplit('-').next().unwrap().len(), 8);

        assert_eq!(telemetry.metric_values(names::ALERTS_CREATED), vec![1.0]);
        assert_eq!(telemetry.metric_values(names::FRAUD_PREVENTED_AMOUNT), vec![50_000.0]);
        assert_eq!(telemetry.metric_values(names::SAR_FILED), vec![1.0]);
    }

    #[tokio::test]
    async fn test_medium_alert_without_sar() {
        let (payload, telemetry) = alert_for(&FraudAlertStage::new(), 300.0, 0.55, "INVESTIGATE").await;

        assert_eq!(payload["alert_created"], true);
        assert_eq!(payload["severity"], "MEDIUM");
        assert_eq!(payload["sar_filed"], false);
        assert!(telemetry.metric_values(names::FRAUD_PREVENTED_AMOUNT).is_empty());
    }

    #[tokio::test]
    async fn test_large_amount_forces_sar() {
        let (payload, _) = alert_for(&FraudAlertStage::new(), 12_000.0, 0.45, "INVESTIGATE").await;
        assert_eq!(payload["sar_filed"], true);
        assert_eq!(payload["amount_threshold_exceeded"], true);
    }

    #[tokio::test]
    async fn test_low_score_no_alert() {
        let (payload, telemetry) = alert_for(&FraudAlertStage::new(), 20.0, 0.1, "ALLOW").await;
        assert_eq!(payload["alert_created"], false);
        assert_eq!(payload["severity"], "NONE");
        assert!(!payload.contains_key("alert_id"));
        assert!(telemetry.metric_values(names::ALERTS_CREATED).is_empty());
    }

    #[tokio::test]
    async fn test_reasoning_can_raise_alert() {
        let stage = FraudAlertStage::new()
            .with_reasoning(Arc::new(StaticReasoningProvider::always("Pattern matches mule activity. Alert created.")));
        let (payload, _) = alert_for(&stage, 20.0, 0.2, "ALLOW").await;
        assert_eq!(payload["alert_created"], true);
        assert_eq!(payload["severity"], "LOW");
    }

    #[tokio::test]
    async fn test_skips_without_risk_data() {
        let stage = FraudAlertStage::new();
        let run = running_run(Transaction::new("tx-1", "cust-1", 1.0), vec![]);
        let telemetry = InMemoryTelemetry::new();
        let ctx = StageContext::new(&run, &telemetry, stage.name(), 0);

        assert_eq!(stage.execute(&ctx).await, StageOutcome::skip("no risk assessment available"));
    }
}
