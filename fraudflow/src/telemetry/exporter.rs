//! Telemetry backends.

use super::TelemetryEvent;
use crate::errors::TelemetryError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::io::Write;
use std::path::Path;
use tracing::{debug, info, Level};

/// A backend that receives batches of telemetry records.
#[async_trait]
pub trait TelemetryExporter: Send + Sync {
    /// Returns a short exporter name for logs.
    fn name(&self) -> &str;

    /// Exports one batch.
    ///
    /// # Errors
    ///
    /// Returns a [`TelemetryError`] if the backend rejects or cannot receive
    /// the batch. Callers log the error and move on.
    async fn export(&self, batch: &[TelemetryEvent]) -> Result<(), TelemetryError>;
}

/// Discards every batch.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpExporter;

#[async_trait]
impl TelemetryExporter for NoOpExporter {
    fn name(&self) -> &str {
        "noop"
    }

    async fn export(&self, _batch: &[TelemetryEvent]) -> Result<(), TelemetryError> {
        Ok(())
    }
}

/// Writes each record through the `tracing` framework.
#[derive(Debug, Clone)]
pub struct LoggingExporter {
    level: Level,
}

impl Default for LoggingExporter {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingExporter {
    /// Creates a logging exporter with the specified level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging exporter.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }
}

#[async_trait]
impl TelemetryExporter for LoggingExporter {
    fn name(&self) -> &str {
        "logging"
    }

    async fn export(&self, batch: &[TelemetryEvent]) -> Result<(), TelemetryError> {
        for event in batch {
            if self.level == Level::DEBUG {
                debug!(
                    correlation_id = %event.correlation_id,
                    kind = %event.kind,
                    attributes = ?event.attributes,
                    "Telemetry: {}", event.name
                );
            } else {
                info!(
                    correlation_id = %event.correlation_id,
                    kind = %event.kind,
                    attributes = ?event.attributes,
                    "Telemetry: {}", event.name
                );
            }
        }
        Ok(())
    }
}

/// Writes one JSON object per line to any writer.
pub struct JsonLinesExporter {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl JsonLinesExporter {
    /// Creates an exporter over a writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Creates an exporter appending to a file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be opened.
    pub fn to_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(Box::new(std::io::BufWriter::new(file))))
    }
}

impl std::fmt::Debug for JsonLinesExporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsonLinesExporter").finish_non_exhaustive()
    }
}

#[async_trait]
impl TelemetryExporter for JsonLinesExporter {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn export(&self, batch: &[TelemetryEvent]) -> Result<(), TelemetryError> {
        let mut writer = self.writer.lock();
        for event in batch {
            let line = serde_json::to_string(event).map_err(|e| TelemetryError::Serialize(e.to_string()))?;
            writeln!(writer, "{line}").map_err(|e| TelemetryError::Export(e.to_string()))?;
        }
        writer.flush().map_err(|e| TelemetryError::Export(e.to_string()))
    }
}

/// Posts batches as a JSON array to a collector endpoint.
#[cfg(feature = "http-export")]
#[derive(Debug, Clone)]
pub struct HttpExporter {
    client: reqwest::Client,
    endpoint: String,
}

#[cfg(feature = "http-export")]
impl HttpExporter {
    /// Creates an exporter for a collector endpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>, timeout: std::time::Duration) -> Result<Self, TelemetryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("fraudflow/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TelemetryError::Export(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Returns the collector endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[cfg(feature = "http-export")]
#[async_trait]
impl TelemetryExporter for HttpExporter {
    fn name(&self) -> &str {
        "http"
    }

    async fn export(&self, batch: &[TelemetryEvent]) -> Result<(), TelemetryError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(batch)
            .send()
            .await
            .map_err(|e| TelemetryError::Export(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TelemetryError::Export(format!(
                "collector at {} answered {status}",
                self.endpoint
            )))
        }
    }
}
