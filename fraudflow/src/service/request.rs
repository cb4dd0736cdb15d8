//! Request and response documents.

use crate::core::{Outcome, PipelineRun, ReasonCode, RunStatus, StageStatus, Transaction};
use crate::errors::RequestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A request for a fraud decision on one transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionRequest {
    /// Transaction identifier.
    pub transaction_id: String,
    /// Customer identifier.
    pub customer_id: String,
    /// Transaction amount.
    pub amount: f64,
    /// ISO 4217 currency code, `USD` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    /// When the transaction happened, now when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    /// Opaque transaction attributes passed through to stages.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub payload: HashMap<String, serde_json::Value>,
}

impl DecisionRequest {
    /// Creates a request with only the required fields.
    #[must_use]
    pub fn new(transaction_id: impl Into<String>, customer_id: impl Into<String>, amount: f64) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            customer_id: customer_id.into(),
            amount,
            currency: None,
            timestamp: None,
            payload: HashMap::new(),
        }
    }

    /// Sets the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Adds a payload entry.
    #[must_use]
    pub fn with_payload_entry(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Parses a request document.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Malformed`] if `json` is not a request.
    pub fn from_json(json: &str) -> Result<Self, RequestError> {
        serde_json::from_str(json).map_err(|e| RequestError::Malformed(e.to_string()))
    }

    /// Checks field values.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), RequestError> {
        if self.transaction_id.trim().is_empty() {
            return Err(invalid("transactionId", "must not be empty"));
        }
        if self.customer_id.trim().is_empty() {
            return Err(invalid("customerId", "must not be empty"));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(invalid("amount", format!("must be a non-negative number, got {}", self.amount)));
        }
        if let Some(currency) = &self.currency {
            if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
                return Err(invalid("currency", format!("'{currency}' is not a three-letter code")));
            }
        }
        Ok(())
    }

    /// Validates the request and converts it into a [`Transaction`].
    ///
    /// # Errors
    ///
    /// See [`validate`](Self::validate).
    pub fn into_transaction(self) -> Result<Transaction, RequestError> {
        self.validate()?;
        let mut tx = Transaction::new(self.transaction_id, self.customer_id, self.amount).with_payload(self.payload);
        if let Some(currency) = self.currency {
            tx = tx.with_currency(currency.to_ascii_uppercase());
        }
        if let Some(timestamp) = self.timestamp {
            tx = tx.with_timestamp(timestamp);
        }
        Ok(tx)
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> RequestError {
    RequestError::Invalid {
        field,
        message: message.into(),
    }
}

/// How a request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    /// Every stage ran and the policy decided.
    Completed,
    /// A fatal failure or cancellation stopped the run.
    Aborted,
    /// The request never reached the pipeline.
    Rejected,
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}

/// Per-stage line of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageSummary {
    /// Stage name.
    pub name: String,
    /// Recorded status.
    pub status: StageStatus,
    /// Stage duration in milliseconds.
    pub duration_ms: f64,
    /// Failure or skip reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The answer to a [`DecisionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    /// Decision outcome, `null` when undecided.
    pub decision: Option<Outcome>,
    /// Why the outcome was chosen.
    pub reason_code: Option<ReasonCode>,
    /// Run id, also the telemetry correlation id.
    pub run_id: Option<String>,
    /// Echo of the request's transaction id, when it could be read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_id: Option<String>,
    /// How the request ended.
    pub status: ResponseStatus,
    /// Risk score the decision used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
    /// Recorded stages in execution order.
    pub stages: Vec<StageSummary>,
    /// Abort or rejection detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DecisionResponse {
    /// Builds the response for a finalized run.
    #[must_use]
    pub fn from_run(run: &PipelineRun) -> Self {
        let status = match run.status() {
            RunStatus::Completed => ResponseStatus::Completed,
            _ => ResponseStatus::Aborted,
        };
        let decision = run.decision();

        Self {
            decision: decision.map(|d| d.outcome),
            reason_code: decision.map(|d| d.reason_code),
            run_id: Some(run.run_id().to_string()),
            transaction_id: Some(run.transaction().transaction_id().to_string()),
            status,
            risk_score: decision.and_then(|d| d.risk_score),
            stages: run
                .results()
                .iter()
                .map(|r| StageSummary {
                    name: r.stage.clone(),
                    status: r.status,
                    duration_ms: r.duration_ms(),
                    reason: r.reason.clone(),
                })
                .collect(),
            error: run.abort_reason().map(ToString::to_string),
        }
    }

    /// Builds a rejection that never reached the pipeline.
    #[must_use]
    pub fn rejected(error: impl Into<String>, transaction_id: Option<String>) -> Self {
        Self {
            decision: None,
            reason_code: None,
            run_id: None,
            transaction_id,
            status: ResponseStatus::Rejected,
            risk_score: None,
            stages: Vec::new(),
            error: Some(error.into()),
        }
    }
}
