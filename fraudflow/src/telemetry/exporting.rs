//! Queue-backed emitter that exports batches in the background.

use super::{SpanLedger, SpanReport, TelemetryEmitter, TelemetryEvent, TelemetryExporter};
use crate::errors::TelemetryError;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// Counters describing the export queue.
#[derive(Debug, Default)]
pub struct ExportMetrics {
    queued: AtomicU64,
    dropped: AtomicU64,
    exported: AtomicU64,
    failed: AtomicU64,
}

impl ExportMetrics {
    fn record_queued(&self) {
        self.queued.fetch_add(1, Ordering::Relaxed);
    }

    fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn record_exported(&self, count: usize) {
        self.exported.fetch_add(count as u64, Ordering::Relaxed);
    }

    fn record_failed(&self, count: usize) {
        self.failed.fetch_add(count as u64, Ordering::Relaxed);
    }

    /// Returns the number of records accepted into the queue.
    #[must_use]
    pub fn queued(&self) -> u64 {
        self.queued.load(Ordering::Relaxed)
    }

    /// Returns the number of records dropped because the queue was full or closed.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Returns the number of records the exporter accepted.
    #[must_use]
    pub fn exported(&self) -> u64 {
        self.exported.load(Ordering::Relaxed)
    }

    /// Returns the number of records in batches the exporter rejected.
    #[must_use]
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Returns the drop rate as a percentage of everything offered.
    #[must_use]
    pub fn drop_rate(&self) -> f64 {
        let queued = self.queued();
        let dropped = self.dropped();
        let total = queued + dropped;
        if total == 0 {
            0.0
        } else {
            (dropped as f64 / total as f64) * 100.0
        }
    }

    /// Converts metrics to JSON.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "queued": self.queued(),
            "dropped": self.dropped(),
            "exported": self.exported(),
            "failed": self.failed(),
            "drop_rate_percent": (self.drop_rate() * 100.0).round() / 100.0,
        })
    }
}

/// Shortest flush interval the export worker accepts.
const MIN_FLUSH_INTERVAL: Duration = Duration::from_millis(1);

/// Tuning for [`ExportingTelemetry`].
#[derive(Debug, Clone, Copy)]
pub struct ExportSettings {
    /// Maximum records waiting in the queue.
    pub queue_capacity: usize,
    /// Records per exporter call.
    pub batch_size: usize,
    /// Maximum time a partial batch waits before export. Values below
    /// one millisecond are raised to one millisecond.
    pub flush_interval: Duration,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 4096,
            batch_size: 64,
            flush_interval: Duration::from_millis(500),
        }
    }
}

/// An emitter that queues records and exports them from a worker task.
///
/// The queue is bounded: when it is full the record is dropped and
/// counted, so emission never blocks a pipeline run.
pub struct ExportingTelemetry {
    ledger: SpanLedger,
    tx: RwLock<Option<mpsc::Sender<TelemetryEvent>>>,
    capacity: usize,
    metrics: Arc<ExportMetrics>,
    worker: Mutex<Option<JoinHandle<()>>>,
    exporter_name: String,
}

impl ExportingTelemetry {
    /// Creates the emitter and spawns its export worker.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(exporter: Arc<dyn TelemetryExporter>, settings: ExportSettings) -> Arc<Self> {
        let capacity = settings.queue_capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        let metrics = Arc::new(ExportMetrics::default());
        let exporter_name = exporter.name().to_string();

        let worker = tokio::spawn(export_worker(rx, exporter, settings, metrics.clone()));

        Arc::new(Self {
            ledger: SpanLedger::new(),
            tx: RwLock::new(Some(tx)),
            capacity,
            metrics,
            worker: Mutex::new(Some(worker)),
            exporter_name,
        })
    }

    /// Returns the queue metrics.
    #[must_use]
    pub fn metrics(&self) -> &ExportMetrics {
        &self.metrics
    }

    /// Returns the current queue depth.
    #[must_use]
    pub fn queue_size(&self) -> usize {
        self.tx
            .read()
            .as_ref()
            .map_or(0, |tx| self.capacity - tx.capacity())
    }

    /// Returns true until [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tx.read().is_some()
    }

    /// Closes the queue, waits for queued records to be exported and
    /// returns the final span balance.
    ///
    /// Unterminated spans are logged at error level and returned in the
    /// report.
    pub async fn shutdown(&self) -> SpanReport {
        drop(self.tx.write().take());

        let worker = self.worker.lock().take();
        if let Some(handle) = worker {
            if let Err(e) = handle.await {
                error!(error = %e, "Telemetry export worker terminated abnormally");
            }
        }

        let report = self.ledger.report();
        for span in &report.unterminated {
            error!(
                span_id = span.id,
                span_name = %span.name,
                correlation_id = %span.correlation_id,
                started_at = %span.started_at,
                "Unterminated span at telemetry shutdown"
            );
        }
        info!(
            exporter = %self.exporter_name,
            spans_started = report.started,
            spans_ended = report.ended,
            metrics = %self.metrics.to_json(),
            "Telemetry shut down"
        );
        report
    }

    fn report_drop(&self, err: &TelemetryError) {
        self.metrics.record_drop();
        warn!(
            error = %err,
            dropped_total = self.metrics.dropped(),
            "Telemetry record dropped"
        );
    }
}

impl std::fmt::Debug for ExportingTelemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportingTelemetry")
            .field("exporter", &self.exporter_name)
            .field("capacity", &self.capacity)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl TelemetryEmitter for ExportingTelemetry {
    fn ledger(&self) -> &SpanLedger {
        &self.ledger
    }

    fn dispatch(&self, event: TelemetryEvent) {
        let guard = self.tx.read();
        let Some(tx) = guard.as_ref() else {
            self.report_drop(&TelemetryError::QueueClosed { event: event.name });
            return;
        };

        match tx.try_send(event) {
            Ok(()) => self.metrics.record_queued(),
            Err(mpsc::error::TrySendError::Full(event)) => self.report_drop(&TelemetryError::QueueFull {
                capacity: self.capacity,
                event: event.name,
            }),
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.report_drop(&TelemetryError::QueueClosed { event: event.name });
            }
        }
    }
}

async fn export_worker(
    mut rx: mpsc::Receiver<TelemetryEvent>,
    exporter: Arc<dyn TelemetryExporter>,
    settings: ExportSettings,
    metrics: Arc<ExportMetrics>,
) {
    let batch_size = settings.batch_size.max(1);
    let mut batch = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(settings.flush_interval.max(MIN_FLUSH_INTERVAL));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(event) => {
                    batch.push(event);
                    if batch.len() >= batch_size {
                        flush(exporter.as_ref(), &mut batch, &metrics).await;
                    }
                }
                None => {
                    flush(exporter.as_ref(), &mut batch, &metrics).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                flush(exporter.as_ref(), &mut batch, &metrics).await;
            }
        }
    }
}

async fn flush(exporter: &dyn TelemetryExporter, batch: &mut Vec<TelemetryEvent>, metrics: &ExportMetrics) {
    if batch.is_empty() {
        return;
    }
    match exporter.export(batch).await {
        Ok(()) => metrics.record_exported(batch.len()),
        Err(e) => {
            metrics.record_failed(batch.len());
            warn!(
                exporter = exporter.name(),
                batch_size = batch.len(),
                error = %e,
                "Telemetry export failed"
            );
        }
    }
    batch.clear();
}
