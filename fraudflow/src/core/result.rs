//! Recorded result of one stage.

use super::StageStatus;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Serializes a [`Duration`] as fractional milliseconds.
mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64() * 1000.0)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let ms = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(ms.max(0.0) / 1000.0))
    }
}

/// The data produced by one pipeline stage.
///
/// Owned by the [`PipelineRun`](super::PipelineRun) that recorded it; the
/// run only hands out shared references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage name.
    pub stage: String,
    /// Zero-based execution index within the run.
    pub sequence: usize,
    /// Stage status.
    pub status: StageStatus,
    /// Stage specific output.
    #[serde(default)]
    pub payload: HashMap<String, serde_json::Value>,
    /// Wall-clock time spent in the stage.
    #[serde(rename = "duration_ms", with = "duration_ms")]
    pub duration: Duration,
    /// Metric values emitted by the stage.
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
    /// Failure or skip reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl StageResult {
    /// Creates a successful result.
    #[must_use]
    pub fn success(
        stage: impl Into<String>,
        sequence: usize,
        payload: HashMap<String, serde_json::Value>,
        metrics: BTreeMap<String, f64>,
        duration: Duration,
    ) -> Self {
        Self {
            stage: stage.into(),
            sequence,
            status: StageStatus::Success,
            payload,
            duration,
            metrics,
            reason: None,
        }
    }

    /// Creates a failed result.
    #[must_use]
    pub fn failed(
        stage: impl Into<String>,
        sequence: usize,
        reason: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            stage: stage.into(),
            sequence,
            status: StageStatus::Failed,
            payload: HashMap::new(),
            duration,
            metrics: BTreeMap::new(),
            reason: Some(reason.into()),
        }
    }

    /// Creates a skipped result.
    #[must_use]
    pub fn skipped(
        stage: impl Into<String>,
        sequence: usize,
        reason: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            stage: stage.into(),
            sequence,
            status: StageStatus::Skipped,
            payload: HashMap::new(),
            duration,
            metrics: BTreeMap::new(),
            reason: Some(reason.into()),
        }
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        self.duration.as_secs_f64() * 1000.0
    }

    /// Returns a payload value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.payload.get(key)
    }

    /// Returns a payload value as `f64`.
    #[must_use]
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.payload.get(key).and_then(serde_json::Value::as_f64)
    }

    /// Returns a payload value as `&str`.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.payload.get(key).and_then(serde_json::Value::as_str)
    }

    /// Returns true if the stage succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_result_success() {
        let mut payload = HashMap::new();
        payload.insert("risk_score".to_string(), serde_json::json!(0.4));

        let result = StageResult::success("risk", 1, payload, BTreeMap::new(), Duration::from_millis(5));

        assert_eq!(result.stage, "risk");
        assert!(result.is_success());
        assert_eq!(result.get_f64("risk_score"), Some(0.4));
        assert!(result.reason.is_none());
    }

    #[test]
    fn test_stage_result_failed() {
        let result = StageResult::failed("customer_data", 0, "lookup miss", Duration::ZERO);

        assert!(result.is_failure());
        assert_eq!(result.reason.as_deref(), Some("lookup miss"));
        assert!(result.payload.is_empty());
    }

    #[test]
    fn test_stage_result_duration_serialization() {
        let result = StageResult::skipped("alert", 2, "disabled", Duration::from_millis(12));
        let json = serde_json::to_value(&result).unwrap();

        assert_eq!(json["duration_ms"], serde_json::json!(12.0));
        assert_eq!(json["status"], "skipped");

        let back: StageResult = serde_json::from_value(json).unwrap();
        assert!((back.duration_ms() - 12.0).abs() < 0.001);
    }
}
