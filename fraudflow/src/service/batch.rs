//! Concurrent processing of many decision requests.

use super::{DecisionRequest, DecisionResponse, DecisionService, ResponseStatus};
use crate::core::Outcome;
use futures::stream::{self, StreamExt};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::info;

/// Counts and responses for one batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    /// Requests submitted.
    pub total: usize,
    /// Requests whose run completed.
    pub completed: usize,
    /// Requests whose run aborted.
    pub aborted: usize,
    /// Requests rejected before reaching the pipeline.
    pub rejected: usize,
    /// Approved decisions.
    pub approved: usize,
    /// Investigate decisions.
    pub investigate: usize,
    /// Blocked decisions.
    pub blocked: usize,
    /// Requests that ended without a decision.
    pub undecided: usize,
    /// Wall clock time for the whole batch.
    pub elapsed_ms: f64,
    /// One response per request, in request order.
    pub responses: Vec<DecisionResponse>,
}

impl BatchSummary {
    /// Tallies responses.
    #[must_use]
    pub fn from_responses(responses: Vec<DecisionResponse>, elapsed: Duration) -> Self {
        let mut summary = Self {
            total: responses.len(),
            completed: 0,
            aborted: 0,
            rejected: 0,
            approved: 0,
            investigate: 0,
            blocked: 0,
            undecided: 0,
            elapsed_ms: elapsed.as_secs_f64() * 1000.0,
            responses: Vec::new(),
        };

        for resp in &responses {
            match resp.status {
                ResponseStatus::Completed => summary.completed += 1,
                ResponseStatus::Aborted => summary.aborted += 1,
                ResponseStatus::Rejected => summary.rejected += 1,
            }
            match resp.decision {
                Some(Outcome::Approved) => summary.approved += 1,
                Some(Outcome::Investigate) => summary.investigate += 1,
                Some(Outcome::Blocked) => summary.blocked += 1,
                None => summary.undecided += 1,
            }
        }
        summary.responses = responses;
        summary
    }
}

/// Runs requests through a [`DecisionService`] with bounded concurrency.
///
/// Each run stays sequential; only independent runs overlap.
#[derive(Debug, Clone)]
pub struct BatchRunner {
    service: DecisionService,
    jitter: Duration,
    shuffle: bool,
}

impl BatchRunner {
    /// Creates a runner without jitter or shuffling.
    #[must_use]
    pub fn new(service: DecisionService) -> Self {
        Self {
            service,
            jitter: Duration::ZERO,
            shuffle: false,
        }
    }

    /// Delays each run by a random amount up to `jitter`.
    #[must_use]
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Dispatches requests in random order.
    #[must_use]
    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    /// Returns the underlying service.
    #[must_use]
    pub fn service(&self) -> &DecisionService {
        &self.service
    }

    /// Processes every request with at most `concurrency` runs in flight.
    ///
    /// A `concurrency` of zero is treated as one. Responses come back in
    /// request order regardless of dispatch order.
    pub async fn run(&self, requests: Vec<DecisionRequest>, concurrency: usize) -> BatchSummary {
        let started = Instant::now();
        let total = requests.len();

        let mut indexed: Vec<(usize, DecisionRequest)> = requests.into_iter().enumerate().collect();
        if self.shuffle {
            indexed.shuffle(&mut rand::thread_rng());
        }

        let mut responses: Vec<(usize, DecisionResponse)> = stream::iter(indexed)
            .map(|(index, request)| {
                let delay = self.jitter_delay();
                let service = self.service.clone();
                async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    (index, service.handle(request).await)
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;
        responses.sort_unstable_by_key(|(index, _)| *index);

        let summary =
            BatchSummary::from_responses(responses.into_iter().map(|(_, r)| r).collect(), started.elapsed());
        info!(
            total,
            completed = summary.completed,
            aborted = summary.aborted,
            rejected = summary.rejected,
            blocked = summary.blocked,
            elapsed_ms = summary.elapsed_ms,
            "Batch finished"
        );
        summary
    }

    fn jitter_delay(&self) -> Duration {
        let max_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::{InMemoryTelemetry, TelemetryEmitter};
    use crate::testing::fraud_pipeline;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    fn requests() -> Vec<DecisionRequest> {
        vec![
            DecisionRequest::new("tx-1", "cust-1001", 20.0),
            DecisionRequest::new("tx-2", "cust-1001", 50_000.0)
                .with_payload_entry("new_device", serde_json::json!(true))
                .with_payload_entry("high_risk_merchant", serde_json::json!(true))
                .with_payload_entry("card_present", serde_json::json!(false)),
            DecisionRequest::new("tx-3", "cust-9999", 10.0),
            DecisionRequest::new("", "cust-1001", 10.0),
        ]
    }

    fn runner(telemetry: Arc<InMemoryTelemetry>) -> BatchRunner {
        BatchRunner::new(DecisionService::new(fraud_pipeline(telemetry).unwrap()))
    }

    #[tokio::test]
    async fn test_batch_counts() {
        let summary = runner(Arc::new(InMemoryTelemetry::new())).run(requests(), 4).await;

        assert_eq!(summary.total, 4);
        assert_eq!(summary.completed, 2);
        assert_eq!(summary.aborted, 1);
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.approved, 1);
        // the large purchase plus the aborted run's fallback
        assert_eq!(summary.blocked, 2);
        assert_eq!(summary.undecided, 1);
    }

    #[tokio::test]
    async fn test_shuffled_batch_keeps_request_order() {
        let telemetry = Arc::new(InMemoryTelemetry::new());
        let summary = runner(telemetry.clone())
            .with_shuffle(true)
            .with_jitter(Duration::from_millis(5))
            .run(requests(), 2)
            .await;

        let ids: Vec<Option<&str>> = summary.responses.iter().map(|r| r.transaction_id.as_deref()).collect();
        assert_eq!(ids, vec![Some("tx-1"), Some("tx-2"), Some("tx-3"), Some("")]);
        assert!(telemetry.span_report().is_balanced());
    }

    #[tokio::test]
    async fn test_zero_concurrency_still_runs() {
        let summary = runner(Arc::new(InMemoryTelemetry::new()))
            .run(vec![DecisionRequest::new("tx-1", "cust-1001", 20.0)], 0)
            .await;

        assert_eq!(summary.completed, 1);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let summary = runner(Arc::new(InMemoryTelemetry::new())).run(Vec::new(), 8).await;

        assert_eq!(summary.total, 0);
        assert!(summary.responses.is_empty());
    }

    #[tokio::test]
    async fn test_summary_serializes_camel_case() {
        let summary = BatchSummary::from_responses(Vec::new(), Duration::from_millis(3));
        let json = serde_json::to_value(&summary).unwrap();

        assert!(json["elapsedMs"].as_f64().unwrap() > 2.9);
        assert_eq!(json["undecided"], 0);
    }
}
