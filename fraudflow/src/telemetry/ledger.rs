//! Span bookkeeping shared by every emitter.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Handle for an open span.
///
/// Not `Clone`: [`TelemetryEmitter::end_span`](super::TelemetryEmitter::end_span)
/// consumes it, so a span can be ended at most once. A handle dropped
/// without being ended stays open in the ledger and shows up in the
/// shutdown report.
#[derive(Debug)]
pub struct SpanHandle {
    id: u64,
    name: String,
    correlation_id: String,
    start: Instant,
}

impl SpanHandle {
    /// Returns the span id.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the correlation id the span was opened with.
    #[must_use]
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

/// A span that was started and not yet ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenSpan {
    /// Span id.
    pub id: u64,
    /// Span name.
    pub name: String,
    /// Correlation id.
    pub correlation_id: String,
    /// When the span started.
    pub started_at: DateTime<Utc>,
}

/// Span balance snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SpanReport {
    /// Number of `start_span` calls.
    pub started: u64,
    /// Number of `end_span` calls.
    pub ended: u64,
    /// Spans still open, ordered by id.
    pub unterminated: Vec<OpenSpan>,
}

impl SpanReport {
    /// Returns true when every started span was ended.
    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.started == self.ended && self.unterminated.is_empty()
    }
}

/// Span ids are process-wide so a handle can never close another
/// emitter's span.
static NEXT_SPAN_ID: AtomicU64 = AtomicU64::new(1);

/// Tracks open spans and start/end counters.
#[derive(Debug, Default)]
pub struct SpanLedger {
    started: AtomicU64,
    ended: AtomicU64,
    open: DashMap<u64, OpenSpan>,
}

impl SpanLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a span and returns its handle.
    pub fn open(&self, name: &str, correlation_id: &str) -> SpanHandle {
        let id = NEXT_SPAN_ID.fetch_add(1, Ordering::Relaxed);
        self.open.insert(
            id,
            OpenSpan {
                id,
                name: name.to_string(),
                correlation_id: correlation_id.to_string(),
                started_at: Utc::now(),
            },
        );
        self.started.fetch_add(1, Ordering::SeqCst);
        SpanHandle {
            id,
            name: name.to_string(),
            correlation_id: correlation_id.to_string(),
            start: Instant::now(),
        }
    }

    /// Closes a span, returning its duration in milliseconds.
    ///
    /// Returns `None` if the span is unknown to this ledger (a handle from
    /// a different emitter).
    pub fn close(&self, handle: &SpanHandle) -> Option<f64> {
        self.open.remove(&handle.id)?;
        self.ended.fetch_add(1, Ordering::SeqCst);
        Some(handle.elapsed_ms())
    }

    /// Returns the number of spans currently open.
    #[must_use]
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Returns a balance snapshot.
    #[must_use]
    pub fn report(&self) -> SpanReport {
        let mut unterminated: Vec<OpenSpan> = self.open.iter().map(|e| e.value().clone()).collect();
        unterminated.sort_by_key(|s| s.id);
        SpanReport {
            started: self.started.load(Ordering::SeqCst),
            ended: self.ended.load(Ordering::SeqCst),
            unterminated,
        }
    }
}
