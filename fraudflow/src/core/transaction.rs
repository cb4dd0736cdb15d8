//! The immutable transaction input.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_currency() -> String {
    "USD".to_string()
}

/// A transaction submitted for a fraud decision.
///
/// Created once per request. Fields are private and there is no mutating
/// API, so stages can only ever observe it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    transaction_id: String,
    customer_id: String,
    amount: f64,
    #[serde(default = "default_currency")]
    currency: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    payload: HashMap<String, serde_json::Value>,
}

impl Transaction {
    /// Creates a new transaction timestamped now, in USD.
    #[must_use]
    pub fn new(transaction_id: impl Into<String>, customer_id: impl Into<String>, amount: f64) -> Self {
        Self {
            transaction_id: transaction_id.into(),
            customer_id: customer_id.into(),
            amount,
            currency: default_currency(),
            timestamp: Utc::now(),
            payload: HashMap::new(),
        }
    }

    /// Sets the currency.
    #[must_use]
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    /// Sets the timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Replaces the raw payload.
    #[must_use]
    pub fn with_payload(mut self, payload: HashMap<String, serde_json::Value>) -> Self {
        self.payload = payload;
        self
    }

    /// Adds a single payload entry.
    #[must_use]
    pub fn with_payload_entry(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.payload.insert(key.into(), value);
        self
    }

    /// Returns the transaction identifier.
    #[must_use]
    pub fn transaction_id(&self) -> &str {
        &self.transaction_id
    }

    /// Returns the customer identifier.
    #[must_use]
    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    /// Returns the amount.
    #[must_use]
    pub fn amount(&self) -> f64 {
        self.amount
    }

    /// Returns the ISO currency code.
    #[must_use]
    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Returns the transaction timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the raw payload.
    #[must_use]
    pub fn payload(&self) -> &HashMap<String, serde_json::Value> {
        &self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_defaults() {
        let tx = Transaction::new("TX1001", "CUST1001", 5200.0);
        assert_eq!(tx.transaction_id(), "TX1001");
        assert_eq!(tx.customer_id(), "CUST1001");
        assert_eq!(tx.currency(), "USD");
        assert!(tx.payload().is_empty());
    }

    #[test]
    fn test_transaction_payload_entry() {
        let tx = Transaction::new("TX1", "C1", 1.0)
            .with_currency("EUR")
            .with_payload_entry("device", serde_json::json!("mobile"));

        assert_eq!(tx.currency(), "EUR");
        assert_eq!(tx.payload().get("device"), Some(&serde_json::json!("mobile")));
    }

    #[test]
    fn test_transaction_deserialize_default_currency() {
        let tx: Transaction = serde_json::from_value(serde_json::json!({
            "transaction_id": "TX9",
            "customer_id": "C9",
            "amount": 10.5,
            "timestamp": "2025-01-01T00:00:00Z",
        }))
        .unwrap();

        assert_eq!(tx.currency(), "USD");
        assert!((tx.amount() - 10.5).abs() < f64::EPSILON);
    }
}
