//! Application configuration.
//!
//! Loaded once at startup from an optional JSON file, then overridden by
//! `FRAUDFLOW_*` environment variables (nested keys separated by `__`,
//! e.g. `FRAUDFLOW_POLICY__BLOCK_THRESHOLD=0.8`), then validated.

use crate::errors::ConfigError;
use crate::policy::{AbortFallback, DecisionPolicy};
use crate::stages::{AlertSettings, CustomerDataStage, FraudAlertStage, RiskAnalysisStage};
use crate::telemetry::ExportSettings;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "FRAUDFLOW";

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FraudflowConfig {
    /// Stage ordering and timeouts.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Decision thresholds.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Telemetry backend.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Alert and SAR thresholds.
    #[serde(default)]
    pub alerts: AlertSettings,
    /// Batch execution.
    #[serde(default)]
    pub batch: BatchConfig,
    /// JSON file with customer profiles.
    #[serde(default)]
    pub customers_file: Option<PathBuf>,
}

/// Stage ordering and per-stage execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Stages in execution order.
    #[serde(default = "default_stages")]
    pub stages: Vec<StageConfig>,
    /// Timeout for stages without their own.
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
    /// Whether an unknown customer aborts the run.
    #[serde(default = "default_true")]
    pub unknown_customer_fatal: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stages: default_stages(),
            default_timeout_ms: default_timeout_ms(),
            unknown_customer_fatal: true,
        }
    }
}

impl PipelineConfig {
    /// Returns the effective timeout for a stage.
    #[must_use]
    pub fn timeout_for(&self, stage: &StageConfig) -> Duration {
        Duration::from_millis(stage.timeout_ms.unwrap_or(self.default_timeout_ms))
    }

    /// Validates ordering and timeouts.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-001-EMPTY`, `CONFIG-002-DUPLICATE` or
    /// `CONFIG-005-TIMEOUT`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.is_empty() {
            return Err(ConfigError::new(ConfigError::EMPTY, "Pipeline has no stages")
                .with_fix_hint("List at least one stage under pipeline.stages."));
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage.name.as_str()) {
                return Err(ConfigError::new(
                    ConfigError::DUPLICATE,
                    format!("Stage '{}' is listed more than once", stage.name),
                )
                .with_fix_hint("Each stage may appear once in the ordering.")
                .with_context_entry("stage", stage.name.clone()));
            }
        }

        if self.default_timeout_ms == 0 {
            return Err(ConfigError::new(ConfigError::TIMEOUT, "default_timeout_ms must be greater than 0"));
        }
        if let Some(stage) = self.stages.iter().find(|s| s.timeout_ms == Some(0)) {
            return Err(ConfigError::new(
                ConfigError::TIMEOUT,
                format!("Stage '{}' has a zero timeout", stage.name),
            )
            .with_fix_hint("Remove timeout_ms to use the default, or set a positive value.")
            .with_context_entry("stage", stage.name.clone()));
        }

        Ok(())
    }
}

/// Settings for one stage slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Registered stage name.
    pub name: String,
    /// Disabled stages record a skipped result.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Per-stage timeout.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Whether a timeout aborts the run.
    #[serde(default)]
    pub fatal_on_timeout: bool,
}

impl StageConfig {
    /// Creates an enabled stage slot with the default timeout.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            timeout_ms: None,
            fatal_on_timeout: false,
        }
    }

    /// Sets a timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Makes a timeout abort the run.
    #[must_use]
    pub fn fatal_on_timeout(mut self) -> Self {
        self.fatal_on_timeout = true;
        self
    }

    /// Disables the stage.
    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Decision thresholds and abort handling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Scores at or above this are blocked.
    #[serde(default = "default_block_threshold")]
    pub block_threshold: f64,
    /// Scores at or above this are investigated.
    #[serde(default = "default_investigate_threshold")]
    pub investigate_threshold: f64,
    /// Decision for aborted runs.
    #[serde(default)]
    pub abort_fallback: AbortFallback,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            block_threshold: default_block_threshold(),
            investigate_threshold: default_investigate_threshold(),
            abort_fallback: AbortFallback::default(),
        }
    }
}

impl PolicyConfig {
    /// Builds the policy.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-004-THRESHOLDS` for invalid thresholds.
    pub fn to_policy(&self) -> Result<DecisionPolicy, ConfigError> {
        DecisionPolicy::new(self.block_threshold, self.investigate_threshold)
    }
}

/// Telemetry backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExporterKind {
    /// Log records through `tracing`.
    #[default]
    Logging,
    /// Append JSON lines to `telemetry.path`.
    JsonLines,
    /// POST batches to `telemetry.endpoint`.
    Http,
    /// Drop records.
    None,
}

/// Telemetry export settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Backend.
    #[serde(default)]
    pub exporter: ExporterKind,
    /// Output file for `json_lines`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Collector URL for `http`.
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Bounded queue size.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Records per export call.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Partial batch flush interval.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// HTTP request timeout.
    #[serde(default = "default_export_timeout_ms")]
    pub export_timeout_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            exporter: ExporterKind::default(),
            path: None,
            endpoint: None,
            queue_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            export_timeout_ms: default_export_timeout_ms(),
        }
    }
}

impl TelemetryConfig {
    /// Returns queue tuning for the exporting emitter.
    #[must_use]
    pub fn export_settings(&self) -> ExportSettings {
        ExportSettings {
            queue_capacity: self.queue_capacity,
            batch_size: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
        }
    }

    /// Validates the backend settings.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-006-TELEMETRY` for missing targets or zero sizes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: &str| ConfigError::new(ConfigError::TELEMETRY, message);

        if self.queue_capacity == 0 || self.batch_size == 0 || self.flush_interval_ms == 0 {
            return Err(invalid("queue_capacity, batch_size and flush_interval_ms must be greater than 0"));
        }
        match self.exporter {
            ExporterKind::JsonLines if self.path.is_none() => {
                Err(invalid("json_lines exporter needs telemetry.path")
                    .with_fix_hint("Set telemetry.path or FRAUDFLOW_TELEMETRY__PATH."))
            }
            ExporterKind::Http if self.endpoint.as_deref().map_or(true, str::is_empty) => {
                Err(invalid("http exporter needs telemetry.endpoint")
                    .with_fix_hint("Set telemetry.endpoint or FRAUDFLOW_TELEMETRY__ENDPOINT."))
            }
            #[cfg(not(feature = "http-export"))]
            ExporterKind::Http => Err(invalid("http exporter requires the http-export feature")),
            _ => Ok(()),
        }
    }
}

/// Batch runner settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Runs in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Upper bound of a random delay before each run, in milliseconds.
    #[serde(default)]
    pub jitter_ms: u64,
    /// Process requests in random order.
    #[serde(default)]
    pub shuffle: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            jitter_ms: 0,
            shuffle: false,
        }
    }
}

impl FraudflowConfig {
    /// Loads configuration from an optional JSON file and the process
    /// environment, then validates it.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-007-SOURCE` if a source cannot be read or parsed,
    /// or the first validation error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load) but reads overrides from `env` instead of
    /// the process environment when given.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn load_with_env(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Json));
        }
        Self::finish(builder, env)
    }

    /// Parses configuration from a JSON string, applying environment
    /// overrides from `env` only.
    ///
    /// # Errors
    ///
    /// See [`load`](Self::load).
    pub fn from_json_str(json: &str, env: Option<HashMap<String, String>>) -> Result<Self, ConfigError> {
        let builder =
            config::Config::builder().add_source(config::File::from_str(json, config::FileFormat::Json));
        Self::finish(builder, Some(env.unwrap_or_default()))
    }

    fn finish(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let source_error = |e: config::ConfigError| {
            ConfigError::new(ConfigError::SOURCE, e.to_string())
                .with_fix_hint("Check the configuration file and FRAUDFLOW_* variables.")
        };

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .map_err(source_error)?;

        let config: Self = settings.try_deserialize().map_err(source_error)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every section.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pipeline.validate()?;
        self.policy.to_policy()?;
        self.telemetry.validate()?;
        if self.batch.concurrency == 0 {
            return Err(ConfigError::new(ConfigError::SOURCE, "batch.concurrency must be greater than 0"));
        }
        Ok(())
    }
}

fn default_stages() -> Vec<StageConfig> {
    vec![
        StageConfig::new(CustomerDataStage::NAME),
        StageConfig::new(RiskAnalysisStage::NAME),
        StageConfig::new(FraudAlertStage::NAME),
    ]
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_true() -> bool {
    true
}

fn default_block_threshold() -> f64 {
    0.75
}

fn default_investigate_threshold() -> f64 {
    0.40
}

fn default_queue_capacity() -> usize {
    4_096
}

fn default_batch_size() -> usize {
    64
}

fn default_flush_interval_ms() -> u64 {
    500
}

fn default_export_timeout_ms() -> u64 {
    5_000
}

fn default_concurrency() -> usize {
    std::thread::available_parallelism().map_or(4, std::num::NonZeroUsize::get)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect())
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = FraudflowConfig::from_json_str("{}", None).unwrap();

        assert_eq!(config.pipeline.stages.len(), 3);
        assert_eq!(config.pipeline.stages[0].name, "customer_data");
        assert_eq!(config.policy.block_threshold, 0.75);
        assert_eq!(config.policy.abort_fallback, AbortFallback::Block);
        assert_eq!(config.telemetry.exporter, ExporterKind::Logging);
    }

    #[test]
    fn test_file_values() {
        let json = r#"{
            "pipeline": {
                "stages": [
                    {"name": "customer_data", "timeout_ms": 250, "fatal_on_timeout": true},
                    {"name": "risk_analysis"},
                    {"name": "fraud_alert", "enabled": false}
                ]
            },
            "policy": {"block_threshold": 0.9, "investigate_threshold": 0.5, "abort_fallback": "none"}
        }"#;
        let config = FraudflowConfig::from_json_str(json, None).unwrap();

        let first = &config.pipeline.stages[0];
        assert_eq!(config.pipeline.timeout_for(first), Duration::from_millis(250));
        assert!(first.fatal_on_timeout);
        assert!(!config.pipeline.stages[2].enabled);
        assert_eq!(config.policy.abort_fallback, AbortFallback::None);
    }

    #[test]
    fn test_env_overrides_file() {
        let config = FraudflowConfig::from_json_str(
            r#"{"policy": {"block_threshold": 0.9, "investigate_threshold": 0.5}}"#,
            env(&[("FRAUDFLOW_POLICY__BLOCK_THRESHOLD", "0.8"), ("FRAUDFLOW_BATCH__CONCURRENCY", "2")]),
        )
        .unwrap();

        assert_eq!(config.policy.block_threshold, 0.8);
        assert_eq!(config.policy.investigate_threshold, 0.5);
        assert_eq!(config.batch.concurrency, 2);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let err = FraudflowConfig::from_json_str(
            r#"{"policy": {"block_threshold": 0.4, "investigate_threshold": 0.6}}"#,
            None,
        )
        .unwrap_err();
        assert_eq!(err.code, ConfigError::THRESHOLDS);
    }

    #[test]
    fn test_stage_list_errors() {
        let empty = FraudflowConfig::from_json_str(r#"{"pipeline": {"stages": []}}"#, None).unwrap_err();
        assert_eq!(empty.code, ConfigError::EMPTY);

        let dup = FraudflowConfig::from_json_str(
            r#"{"pipeline": {"stages": [{"name": "a"}, {"name": "a"}]}}"#,
            None,
        )
        .unwrap_err();
        assert_eq!(dup.code, ConfigError::DUPLICATE);

        let zero = FraudflowConfig::from_json_str(
            r#"{"pipeline": {"stages": [{"name": "a", "timeout_ms": 0}]}}"#,
            None,
        )
        .unwrap_err();
        assert_eq!(zero.code, ConfigError::TIMEOUT);
    }

    #[test]
    fn test_telemetry_validation() {
        let err = FraudflowConfig::from_json_str(r#"{"telemetry": {"exporter": "json_lines"}}"#, None).unwrap_err();
        assert_eq!(err.code, ConfigError::TELEMETRY);

        let err = FraudflowConfig::from_json_str(r#"{"telemetry": {"queue_capacity": 0}}"#, None).unwrap_err();
        assert_eq!(err.code, ConfigError::TELEMETRY);
    }

    #[test]
    fn test_malformed_source() {
        let err = FraudflowConfig::from_json_str("{not json", None).unwrap_err();
        assert_eq!(err.code, ConfigError::SOURCE);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fraudflow.json");
        std::fs::write(&path, r#"{"batch": {"concurrency": 3}}"#).unwrap();

        let config = FraudflowConfig::load_with_env(Some(&path), env(&[])).unwrap();
        assert_eq!(config.batch.concurrency, 3);
    }
}
