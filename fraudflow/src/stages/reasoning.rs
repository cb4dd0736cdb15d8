//! Pluggable text reasoning used by the analysis stages.

use crate::errors::ReasoningError;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A reasoning provider's answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningResponse {
    /// Free-form answer text.
    pub content: String,
    /// Model identifier reported by the provider.
    pub model: String,
    /// Provider identifier.
    pub provider: String,
    /// Prompt tokens, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<u32>,
    /// Answer tokens, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<u32>,
    /// Provider latency.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
}

impl ReasoningResponse {
    /// Creates a response with only content and origin.
    #[must_use]
    pub fn new(content: impl Into<String>, model: impl Into<String>, provider: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: model.into(),
            provider: provider.into(),
            input_tokens: None,
            output_tokens: None,
            latency_ms: None,
        }
    }

    /// Returns total tokens.
    #[must_use]
    pub fn total_tokens(&self) -> u32 {
        self.input_tokens.unwrap_or(0) + self.output_tokens.unwrap_or(0)
    }

    /// Converts to telemetry attributes.
    #[must_use]
    pub fn to_attributes(&self) -> crate::telemetry::Attributes {
        let mut map = crate::telemetry::Attributes::new();
        map.insert("reasoning.model".to_string(), serde_json::json!(self.model));
        map.insert("reasoning.provider".to_string(), serde_json::json!(self.provider));
        map.insert("reasoning.total_tokens".to_string(), serde_json::json!(self.total_tokens()));
        if let Some(l) = self.latency_ms {
            map.insert("reasoning.latency_ms".to_string(), serde_json::json!(l));
        }
        map
    }
}

/// Turns a prompt into analysis text.
///
/// Model inference lives outside this crate; implementations wrap whatever
/// service produces the text.
#[async_trait]
pub trait ReasoningProvider: Send + Sync + Debug {
    /// Returns the provider name.
    fn name(&self) -> &str;

    /// Answers a prompt.
    ///
    /// # Errors
    ///
    /// Returns a [`ReasoningError`] when no usable answer is available.
    async fn reason(&self, prompt: &str) -> Result<ReasoningResponse, ReasoningError>;
}

/// Returns canned answers.
///
/// Pattern rules are checked first (case-insensitive substring match on
/// the prompt); otherwise responses are returned round-robin.
#[derive(Debug, Default)]
pub struct StaticReasoningProvider {
    responses: Vec<String>,
    patterns: Vec<(String, String)>,
    failure: Option<String>,
    call_count: AtomicUsize,
    prompts: RwLock<Vec<String>>,
}

impl StaticReasoningProvider {
    /// Creates a provider cycling through `responses`.
    #[must_use]
    pub fn new(responses: Vec<String>) -> Self {
        Self {
            responses,
            ..Self::default()
        }
    }

    /// Creates a provider that always answers `text`.
    #[must_use]
    pub fn always(text: impl Into<String>) -> Self {
        Self::new(vec![text.into()])
    }

    /// Creates a provider that always fails.
    #[must_use]
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Answers `response` whenever the prompt contains `needle`.
    #[must_use]
    pub fn with_pattern(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.patterns.push((needle.into().to_lowercase(), response.into()));
        self
    }

    /// Returns the call count.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Returns every prompt received, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.read().clone()
    }
}

#[async_trait]
impl ReasoningProvider for StaticReasoningProvider {
    fn name(&self) -> &str {
        "static"
    }

    async fn reason(&self, prompt: &str) -> Result<ReasoningResponse, ReasoningError> {
        let call = self.call_count.fetch_add(1, Ordering::SeqCst);
        self.prompts.write().push(prompt.to_string());

        if let Some(message) = &self.failure {
            return Err(ReasoningError::Unavailable(message.clone()));
        }

        let lowered = prompt.to_lowercase();
        let content = self
            .patterns
            .iter()
            .find(|(needle, _)| lowered.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .or_else(|| {
                (!self.responses.is_empty()).then(|| self.responses[call % self.responses.len()].clone())
            })
            .ok_or_else(|| ReasoningError::InvalidResponse("no canned response configured".to_string()))?;

        Ok(ReasoningResponse::new(content, "static", self.name()))
    }
}
