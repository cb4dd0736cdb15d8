//! Pipeline builder with validation.

use super::sequential::{SequentialPipeline, StageSlot};
use crate::config::{PipelineConfig, StageConfig};
use crate::errors::ConfigError;
use crate::policy::{AbortFallback, DecisionPolicy};
use crate::stages::PipelineStage;
use crate::telemetry::{NoOpTelemetry, TelemetryEmitter};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating validated sequential pipelines.
///
/// Stages are registered by name. Execution order comes from a
/// [`PipelineConfig`] when one is given, otherwise from the order in which
/// stages were added with [`stage`](Self::stage).
pub struct SequentialPipelineBuilder {
    registry: HashMap<String, Arc<dyn PipelineStage>>,
    stage_order: Vec<StageConfig>,
    config: Option<PipelineConfig>,
    default_timeout: Duration,
    policy: Option<DecisionPolicy>,
    abort_fallback: AbortFallback,
    telemetry: Arc<dyn TelemetryEmitter>,
}

impl Default for SequentialPipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SequentialPipelineBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: HashMap::new(),
            stage_order: Vec::new(),
            config: None,
            default_timeout: Duration::from_millis(PipelineConfig::default().default_timeout_ms),
            policy: None,
            abort_fallback: AbortFallback::default(),
            telemetry: Arc::new(NoOpTelemetry::new()),
        }
    }

    /// Registers a stage under its name without scheduling it.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-002-DUPLICATE` if the name is already registered.
    pub fn register(mut self, stage: Arc<dyn PipelineStage>) -> Result<Self, ConfigError> {
        let name = stage.name().to_string();
        if self.registry.contains_key(&name) {
            return Err(ConfigError::new(
                ConfigError::DUPLICATE,
                format!("Stage '{name}' is already registered"),
            )
            .with_fix_hint("Give each stage instance a distinct name with `with_name`.")
            .with_context_entry("stage", name));
        }
        self.registry.insert(name, stage);
        Ok(self)
    }

    /// Registers a stage and appends it to the execution order.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-002-DUPLICATE` if the name is already registered.
    pub fn stage(self, stage: Arc<dyn PipelineStage>) -> Result<Self, ConfigError> {
        self.stage_with(stage, |slot| slot)
    }

    /// Registers a stage and appends it with adjusted slot settings.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-002-DUPLICATE` if the name is already registered.
    pub fn stage_with(
        self,
        stage: Arc<dyn PipelineStage>,
        configure: impl FnOnce(StageConfig) -> StageConfig,
    ) -> Result<Self, ConfigError> {
        let slot = configure(StageConfig::new(stage.name()));
        let mut builder = self.register(stage)?;
        builder.stage_order.push(slot);
        Ok(builder)
    }

    /// Takes execution order and timeouts from configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Sets the timeout for slots without their own.
    #[must_use]
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Sets the decision policy.
    #[must_use]
    pub fn with_policy(mut self, policy: DecisionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Sets what aborted runs are decided as.
    #[must_use]
    pub fn with_abort_fallback(mut self, fallback: AbortFallback) -> Self {
        self.abort_fallback = fallback;
        self
    }

    /// Sets the telemetry emitter.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetryEmitter>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Returns the number of registered stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.registry.len()
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    ///
    /// Returns `CONFIG-001-EMPTY` for an empty ordering,
    /// `CONFIG-002-DUPLICATE` for a stage listed twice,
    /// `CONFIG-003-UNKNOWN_STAGE` for an unregistered name,
    /// `CONFIG-004-THRESHOLDS` if no policy was set and the default is
    /// somehow invalid, or `CONFIG-005-TIMEOUT` for a zero timeout.
    pub fn build(mut self) -> Result<SequentialPipeline, ConfigError> {
        let config = self.config.take().unwrap_or_else(|| PipelineConfig {
            stages: std::mem::take(&mut self.stage_order),
            default_timeout_ms: u64::try_from(self.default_timeout.as_millis()).unwrap_or(u64::MAX),
            ..PipelineConfig::default()
        });
        config.validate()?;

        let mut slots = Vec::with_capacity(config.stages.len());
        for stage_config in &config.stages {
            let Some(stage) = self.registry.get(&stage_config.name) else {
                let mut known: Vec<&str> = self.registry.keys().map(String::as_str).collect();
                known.sort_unstable();
                return Err(ConfigError::new(
                    ConfigError::UNKNOWN_STAGE,
                    format!("Stage '{}' has no registered implementation", stage_config.name),
                )
                .with_fix_hint(format!("Known stages: {}", known.join(", ")))
                .with_context_entry("stage", stage_config.name.clone()));
            };
            slots.push(StageSlot {
                stage: Arc::clone(stage),
                name: stage_config.name.clone(),
                enabled: stage_config.enabled,
                timeout: config.timeout_for(stage_config),
                fatal_on_timeout: stage_config.fatal_on_timeout,
            });
        }

        let policy = match self.policy {
            Some(policy) => policy,
            None => crate::config::PolicyConfig::default().to_policy()?,
        };

        Ok(SequentialPipeline::new(slots, policy, self.abort_fallback, self.telemetry))
    }
}

impl std::fmt::Debug for SequentialPipelineBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<&String> = self.registry.keys().collect();
        registered.sort_unstable();
        f.debug_struct("SequentialPipelineBuilder")
            .field("registered", &registered)
            .field("stage_order", &self.stage_order)
            .field("policy", &self.policy)
            .field("abort_fallback", &self.abort_fallback)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::NoOpStage;

    fn noop(name: &str) -> Arc<dyn PipelineStage> {
        Arc::new(NoOpStage::new(name))
    }

    #[test]
    fn test_build_in_insertion_order() {
        let pipeline = SequentialPipelineBuilder::new()
            .stage(noop("a"))
            .unwrap()
            .stage(noop("b"))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(pipeline.stage_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_empty_pipeline_rejected() {
        let err = SequentialPipelineBuilder::new().build().unwrap_err();
        assert_eq!(err.code, ConfigError::EMPTY);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let err = SequentialPipelineBuilder::new()
            .stage(noop("a"))
            .unwrap()
            .stage(noop("a"))
            .unwrap_err();
        assert_eq!(err.code, ConfigError::DUPLICATE);
    }

    #[test]
    fn test_config_orders_registered_stages() {
        let config = PipelineConfig {
            stages: vec![StageConfig::new("b"), StageConfig::new("a").disabled()],
            ..PipelineConfig::default()
        };
        let pipeline = SequentialPipelineBuilder::new()
            .register(noop("a"))
            .unwrap()
            .register(noop("b"))
            .unwrap()
            .with_config(config)
            .build()
            .unwrap();

        assert_eq!(pipeline.stage_names(), vec!["b", "a"]);
    }

    #[test]
    fn test_unknown_stage_rejected() {
        let config = PipelineConfig {
            stages: vec![StageConfig::new("missing")],
            ..PipelineConfig::default()
        };
        let err = SequentialPipelineBuilder::new()
            .register(noop("a"))
            .unwrap()
            .with_config(config)
            .build()
            .unwrap_err();

        assert_eq!(err.code, ConfigError::UNKNOWN_STAGE);
        assert_eq!(err.fix_hint.as_deref(), Some("Known stages: a"));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = SequentialPipelineBuilder::new()
            .stage_with(noop("a"), |slot| slot.with_timeout_ms(0))
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err.code, ConfigError::TIMEOUT);
    }
}
