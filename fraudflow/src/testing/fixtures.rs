//! Sample data and a ready-made pipeline for tests and benchmarks.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

use crate::core::Transaction;
use crate::errors::ConfigError;
use crate::pipeline::{SequentialPipeline, SequentialPipelineBuilder};
use crate::stages::{
    CustomerDataStage, CustomerProfile, FraudAlertStage, InMemoryCustomerDirectory, RiskAnalysisStage,
};
use crate::telemetry::TelemetryEmitter;

/// Unix timestamp every fixture transaction carries (2024-06-01T12:00:00Z).
pub const FIXED_TIMESTAMP: i64 = 1_717_243_200;

fn fixed_time() -> DateTime<Utc> {
    DateTime::from_timestamp(FIXED_TIMESTAMP, 0).unwrap_or_default()
}

/// Three customers: an established US account, a 12-day-old UK account
/// and a high-spending German account.
#[must_use]
pub fn sample_customers() -> Vec<CustomerProfile> {
    let now = fixed_time();
    vec![
        CustomerProfile::new("cust-1001", "US", now - Duration::days(1900), 120.0),
        CustomerProfile::new("cust-2002", "GB", now - Duration::days(12), 80.0).with_home_currency("GBP"),
        CustomerProfile::new("cust-3003", "DE", now - Duration::days(1100), 2500.0).with_home_currency("EUR"),
    ]
}

/// A directory holding [`sample_customers`].
#[must_use]
pub fn sample_directory() -> Arc<InMemoryCustomerDirectory> {
    Arc::new(InMemoryCustomerDirectory::from_profiles(sample_customers()))
}

/// A routine purchase by an established customer.
#[must_use]
pub fn small_purchase() -> Transaction {
    Transaction::new("tx-small", "cust-1001", 20.0).with_timestamp(fixed_time())
}

/// A 50,000 USD purchase on a new device at a high-risk merchant.
#[must_use]
pub fn large_purchase() -> Transaction {
    Transaction::new("tx-large", "cust-1001", 50_000.0)
        .with_timestamp(fixed_time())
        .with_payload_entry("new_device", serde_json::json!(true))
        .with_payload_entry("high_risk_merchant", serde_json::json!(true))
        .with_payload_entry("card_present", serde_json::json!(false))
}

/// A purchase by a customer the directory has never seen.
#[must_use]
pub fn unknown_customer_purchase() -> Transaction {
    Transaction::new("tx-ghost", "cust-9999", 75.0).with_timestamp(fixed_time())
}

/// The standard three-stage pipeline over [`sample_directory`] with
/// default thresholds.
///
/// # Errors
///
/// Returns a [`ConfigError`] only if the default configuration is invalid.
pub fn fraud_pipeline(telemetry: Arc<dyn TelemetryEmitter>) -> Result<SequentialPipeline, ConfigError> {
    SequentialPipelineBuilder::new()
        .stage(Arc::new(CustomerDataStage::new(sample_directory())))?
        .stage(Arc::new(RiskAnalysisStage::new()))?
        .stage(Arc::new(FraudAlertStage::new()))?
        .with_telemetry(telemetry)
        .build()
}
