//! Exporters for asserting on what leaves the process.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::TelemetryError;
use crate::telemetry::{TelemetryEvent, TelemetryExporter};

/// Keeps every exported record in memory.
#[derive(Debug, Default)]
pub struct RecordingExporter {
    events: Mutex<Vec<TelemetryEvent>>,
    batches: Mutex<usize>,
}

impl RecordingExporter {
    /// Creates an empty exporter.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every exported record in export order.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Returns how many batches were exported.
    #[must_use]
    pub fn batch_count(&self) -> usize {
        *self.batches.lock()
    }
}

#[async_trait]
impl TelemetryExporter for RecordingExporter {
    fn name(&self) -> &str {
        "recording"
    }

    async fn export(&self, batch: &[TelemetryEvent]) -> Result<(), TelemetryError> {
        self.events.lock().extend_from_slice(batch);
        *self.batches.lock() += 1;
        Ok(())
    }
}

/// Rejects every batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingExporter;

#[async_trait]
impl TelemetryExporter for FailingExporter {
    fn name(&self) -> &str {
        "failing"
    }

    async fn export(&self, batch: &[TelemetryEvent]) -> Result<(), TelemetryError> {
        Err(TelemetryError::Export(format!("backend rejected {} records", batch.len())))
    }
}
