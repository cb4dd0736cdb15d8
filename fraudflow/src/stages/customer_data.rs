//! Customer profile lookup stage.

use super::{PipelineStage, ReasoningProvider, StageContext};
use crate::core::StageOutcome;
use crate::errors::DirectoryError;
use crate::telemetry::{attributes, names, Attributes};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// What the pipeline knows about a customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerProfile {
    /// Customer identifier.
    pub customer_id: String,
    /// ISO country code of residence.
    pub country: String,
    /// Currency the customer usually transacts in.
    #[serde(default = "default_currency")]
    pub home_currency: String,
    /// When the account was opened.
    pub account_opened: DateTime<Utc>,
    /// Average historical transaction amount.
    pub average_amount: f64,
}

fn default_currency() -> String {
    "USD".to_string()
}

impl CustomerProfile {
    /// Creates a profile.
    #[must_use]
    pub fn new(
        customer_id: impl Into<String>,
        country: impl Into<String>,
        account_opened: DateTime<Utc>,
        average_amount: f64,
    ) -> Self {
        Self {
            customer_id: customer_id.into(),
            country: country.into(),
            home_currency: default_currency(),
            account_opened,
            average_amount,
        }
    }

    /// Sets the home currency.
    #[must_use]
    pub fn with_home_currency(mut self, currency: impl Into<String>) -> Self {
        self.home_currency = currency.into();
        self
    }
}

/// Source of customer profiles.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    /// Looks a customer up. `Ok(None)` means the customer does not exist.
    ///
    /// # Errors
    ///
    /// Returns a [`DirectoryError`] if the store cannot answer.
    async fn lookup(&self, customer_id: &str) -> Result<Option<CustomerProfile>, DirectoryError>;
}

/// A directory held in memory.
#[derive(Debug, Default)]
pub struct InMemoryCustomerDirectory {
    profiles: DashMap<String, CustomerProfile>,
}

impl InMemoryCustomerDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a directory from profiles.
    #[must_use]
    pub fn from_profiles(profiles: impl IntoIterator<Item = CustomerProfile>) -> Self {
        let directory = Self::new();
        for profile in profiles {
            directory.insert(profile);
        }
        directory
    }

    /// Loads profiles from a JSON array file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_json_file(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let profiles: Vec<CustomerProfile> = serde_json::from_str(&text)?;
        Ok(Self::from_profiles(profiles))
    }

    /// Adds or replaces a profile.
    pub fn insert(&self, profile: CustomerProfile) {
        self.profiles.insert(profile.customer_id.clone(), profile);
    }

    /// Returns the number of profiles.
    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    /// Returns true if the directory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

#[async_trait]
impl CustomerDirectory for InMemoryCustomerDirectory {
    async fn lookup(&self, customer_id: &str) -> Result<Option<CustomerProfile>, DirectoryError> {
        Ok(self.profiles.get(customer_id).map(|p| p.value().clone()))
    }
}

/// Resolves the customer behind a transaction and derives comparison
/// features for the risk stage.
///
/// An unknown customer aborts the run by default, since nothing downstream
/// can be judged without a profile.
#[derive(Clone)]
pub struct CustomerDataStage {
    name: String,
    directory: Arc<dyn CustomerDirectory>,
    reasoning: Option<Arc<dyn ReasoningProvider>>,
    unknown_customer_fatal: bool,
}

impl CustomerDataStage {
    /// Default stage name.
    pub const NAME: &'static str = "customer_data";

    /// Creates the stage over a directory.
    #[must_use]
    pub fn new(directory: Arc<dyn CustomerDirectory>) -> Self {
        Self {
            name: Self::NAME.to_string(),
            directory,
            reasoning: None,
            unknown_customer_fatal: true,
        }
    }

    /// Overrides the stage name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a narrative analysis from a reasoning provider.
    #[must_use]
    pub fn with_reasoning(mut self, provider: Arc<dyn ReasoningProvider>) -> Self {
        self.reasoning = Some(provider);
        self
    }

    /// Controls whether an unknown customer aborts the run.
    #[must_use]
    pub fn with_unknown_customer_fatal(mut self, fatal: bool) -> Self {
        self.unknown_customer_fatal = fatal;
        self
    }
}

impl std::fmt::Debug for CustomerDataStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomerDataStage")
            .field("name", &self.name)
            .field("reasoning", &self.reasoning.as_ref().map(|p| p.name().to_string()))
            .field("unknown_customer_fatal", &self.unknown_customer_fatal)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PipelineStage for CustomerDataStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, ctx: &StageContext<'_>) -> StageOutcome {
        let tx = ctx.transaction();
        let started = attributes(serde_json::json!({
            "transaction_id": tx.transaction_id(),
            "customer_id": tx.customer_id(),
        }));
        ctx.record_event(&names::stage_event("customer_data", "started"), started);

        let profile = match self.directory.lookup(tx.customer_id()).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                let reason = format!("customer '{}' not found", tx.customer_id());
                warn!(customer_id = tx.customer_id(), fatal = self.unknown_customer_fatal, "Unknown customer");
                return if self.unknown_customer_fatal {
                    StageOutcome::fatal(reason)
                } else {
                    StageOutcome::fail(reason)
                };
            }
            Err(e) => {
                warn!(customer_id = tx.customer_id(), error = %e, "Customer lookup failed");
                return StageOutcome::fail(e.to_string());
            }
        };

        let account_age_days = (tx.timestamp() - profile.account_opened).num_days().max(0);
        let amount_ratio = if profile.average_amount > 0.0 {
            tx.amount() / profile.average_amount
        } else {
            1.0
        };
        let currency_match = tx.currency().eq_ignore_ascii_case(&profile.home_currency);

        let mut payload: HashMap<String, serde_json::Value> = HashMap::new();
        payload.insert("customer_known".to_string(), serde_json::json!(true));
        payload.insert("customer_id".to_string(), serde_json::json!(profile.customer_id));
        payload.insert("account_age_days".to_string(), serde_json::json!(account_age_days));
        payload.insert("country".to_string(), serde_json::json!(profile.country));
        payload.insert("average_amount".to_string(), serde_json::json!(profile.average_amount));
        payload.insert("amount_ratio".to_string(), serde_json::json!(amount_ratio));
        payload.insert("currency_match".to_string(), serde_json::json!(currency_match));

        if let Some(provider) = &self.reasoning {
            let prompt = format!(
                "Analyze customer {} and their transactions comprehensively for fraud detection purposes. \
                 Account age: {account_age_days} days, country: {}, current amount {:.2} {} \
                 against an average of {:.2}.",
                profile.customer_id,
                profile.country,
                tx.amount(),
                tx.currency(),
                profile.average_amount,
            );
            match provider.reason(&prompt).await {
                Ok(response) => {
                    payload.insert("analysis".to_string(), serde_json::json!(response.content));
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Customer analysis unavailable");
                    return StageOutcome::fail(e.to_string());
                }
            }
        }

        ctx.record_metric(names::TRANSACTIONS_PROCESSED, 1.0, Attributes::new());
        ctx.record_event(
            &names::stage_event("customer_data", "completed"),
            attributes(serde_json::json!({
                "transaction_id": tx.transaction_id(),
                "customer_id": tx.customer_id(),
                "account_age_days": account_age_days,
            })),
        );
        debug!(customer_id = tx.customer_id(), amount_ratio, "Customer data resolved");

        StageOutcome::ok(payload)
    }
}
