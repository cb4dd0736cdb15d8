//! Request handling on top of a shared pipeline.

use super::{DecisionRequest, DecisionResponse};
use crate::cancellation::CancellationToken;
use crate::config::FraudflowConfig;
use crate::errors::ConfigError;
use crate::pipeline::{SequentialPipeline, SequentialPipelineBuilder};
use crate::stages::{CustomerDataStage, CustomerDirectory, FraudAlertStage, RiskAnalysisStage};
use crate::telemetry::TelemetryEmitter;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Builds the fraud pipeline described by `config`.
///
/// The three built-in stages are registered under their default names and
/// ordered, enabled and timed by `config.pipeline`.
///
/// # Errors
///
/// Returns the first [`ConfigError`] from stage registration, policy
/// thresholds or pipeline validation.
pub fn build_pipeline(
    config: &FraudflowConfig,
    directory: Arc<dyn CustomerDirectory>,
    telemetry: Arc<dyn TelemetryEmitter>,
) -> Result<SequentialPipeline, ConfigError> {
    let customer_data =
        CustomerDataStage::new(directory).with_unknown_customer_fatal(config.pipeline.unknown_customer_fatal);

    SequentialPipelineBuilder::new()
        .register(Arc::new(customer_data))?
        .register(Arc::new(RiskAnalysisStage::new()))?
        .register(Arc::new(FraudAlertStage::new().with_settings(config.alerts)))?
        .with_config(config.pipeline.clone())
        .with_policy(config.policy.to_policy()?)
        .with_abort_fallback(config.policy.abort_fallback)
        .with_telemetry(telemetry)
        .build()
}

/// Answers decision requests.
///
/// Cheap to clone; clones share the pipeline and the cancellation token.
#[derive(Debug, Clone)]
pub struct DecisionService {
    pipeline: Arc<SequentialPipeline>,
    cancel: CancellationToken,
}

impl DecisionService {
    /// Creates a service around a pipeline.
    #[must_use]
    pub fn new(pipeline: SequentialPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
            cancel: CancellationToken::new(),
        }
    }

    /// Uses `token` to cancel in-flight runs between stages.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Returns the pipeline.
    #[must_use]
    pub fn pipeline(&self) -> &SequentialPipeline {
        &self.pipeline
    }

    /// Returns the cancellation token shared by every run.
    #[must_use]
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs one request through the pipeline.
    pub async fn handle(&self, request: DecisionRequest) -> DecisionResponse {
        let transaction_id = request.transaction_id.clone();
        let transaction = match request.into_transaction() {
            Ok(tx) => tx,
            Err(e) => {
                warn!(%transaction_id, error = %e, "Decision request rejected");
                return DecisionResponse::rejected(e.to_string(), Some(transaction_id));
            }
        };

        match self.pipeline.run_with_cancel(transaction, &self.cancel).await {
            Ok(run) => {
                debug!(run_id = %run.run_id(), status = %run.status(), "Decision request handled");
                DecisionResponse::from_run(&run)
            }
            Err(e) => {
                error!(%transaction_id, error = %e, "Pipeline run failed");
                DecisionResponse::rejected(e.to_string(), Some(transaction_id))
            }
        }
    }

    /// Parses and handles a request document.
    ///
    /// Never fails: malformed documents yield a `rejected` response.
    pub async fn handle_json(&self, json: &str) -> DecisionResponse {
        match DecisionRequest::from_json(json) {
            Ok(request) => self.handle(request).await,
            Err(e) => {
                warn!(error = %e, "Malformed decision request");
                DecisionResponse::rejected(e.to_string(), None)
            }
        }
    }
}
