//! Command line entry point for the fraud decision pipeline.

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use fraudflow::config::{ExporterKind, FraudflowConfig, TelemetryConfig};
use fraudflow::observability::{init_logging, LogFormat};
use fraudflow::service::{build_pipeline, BatchRunner, DecisionRequest, DecisionService};
use fraudflow::stages::InMemoryCustomerDirectory;
use fraudflow::telemetry::{
    ExportingTelemetry, JsonLinesExporter, LoggingExporter, NoOpExporter, NoOpTelemetry, TelemetryExporter,
};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "fraudflow")]
#[command(version)]
#[command(about = "Sequential fraud-detection decision pipeline", long_about = None)]
struct Cli {
    /// JSON configuration file; `FRAUDFLOW_*` variables override it
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// JSON array of customer profiles
    #[arg(long, value_name = "FILE")]
    customers: Option<PathBuf>,

    /// Emit process logs as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    json_logs: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    /// Pretty-print responses
    #[arg(short, long, action = ArgAction::SetTrue)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Decide one request read from a file or stdin
    Decide {
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,
    },

    /// Decide a JSON array of requests
    Batch {
        #[arg(value_name = "FILE")]
        input: Option<PathBuf>,

        /// Runs in flight at once (defaults to batch.concurrency)
        #[arg(long, value_name = "NUM")]
        concurrency: Option<usize>,

        /// Process the batch this many times
        #[arg(long, default_value_t = 1)]
        repeat: u32,

        /// Pause between repetitions
        #[arg(long, default_value_t = 0)]
        interval_secs: u64,

        /// Dispatch requests in random order
        #[arg(long)]
        shuffle: bool,
    },

    /// Validate configuration and print the effective settings
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let format = if cli.json_logs { LogFormat::Json } else { LogFormat::Compact };
    init_logging(format, cli.verbose);

    let mut config = FraudflowConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(path) = cli.customers.clone() {
        config.customers_file = Some(path);
    }

    if matches!(cli.command, Commands::CheckConfig) {
        return check_config(&config, cli.pretty);
    }

    let directory = match &config.customers_file {
        Some(path) => InMemoryCustomerDirectory::from_json_file(path)
            .with_context(|| format!("Failed to load customers from {}", path.display()))?,
        None => {
            warn!("No customers file configured; every customer will be unknown");
            InMemoryCustomerDirectory::new()
        }
    };
    info!(customers = directory.len(), "Customer directory loaded");

    let exporter = build_exporter(&config.telemetry)?;
    let telemetry = ExportingTelemetry::spawn(exporter, config.telemetry.export_settings());
    let pipeline = build_pipeline(&config, Arc::new(directory), telemetry.clone())
        .context("Invalid pipeline configuration")?;
    let service = DecisionService::new(pipeline);

    let token = service.cancellation().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing the current stage and stopping");
            token.cancel("interrupted");
        }
    });

    let outcome = match cli.command {
        Commands::Decide { input } => {
            let text = read_input(input.as_deref())?;
            let response = service.handle_json(&text).await;
            print_json(&response, cli.pretty)
        }
        Commands::Batch {
            input,
            concurrency,
            repeat,
            interval_secs,
            shuffle,
        } => {
            let text = read_input(input.as_deref())?;
            let requests: Vec<DecisionRequest> =
                serde_json::from_str(&text).context("Batch input must be a JSON array of requests")?;
            let runner = BatchRunner::new(service.clone())
                .with_jitter(Duration::from_millis(config.batch.jitter_ms))
                .with_shuffle(shuffle || config.batch.shuffle);
            let concurrency = concurrency.unwrap_or(config.batch.concurrency);
            run_batches(&runner, &requests, concurrency, repeat, Duration::from_secs(interval_secs), cli.pretty)
                .await
        }
        Commands::CheckConfig => Ok(()),
    };

    let report = telemetry.shutdown().await;
    info!(
        exported = telemetry.metrics().exported(),
        dropped = telemetry.metrics().dropped(),
        failed = telemetry.metrics().failed(),
        balanced = report.is_balanced(),
        "Telemetry flushed"
    );

    outcome
}

async fn run_batches(
    runner: &BatchRunner,
    requests: &[DecisionRequest],
    concurrency: usize,
    repeat: u32,
    interval: Duration,
    pretty: bool,
) -> Result<()> {
    let token = runner.service().cancellation().clone();

    for iteration in 1..=repeat.max(1) {
        if token.is_cancelled() {
            warn!(iteration, "Batch loop cancelled");
            break;
        }
        info!(iteration, requests = requests.len(), concurrency, "Starting batch");
        let summary = runner.run(requests.to_vec(), concurrency).await;
        print_json(&summary, pretty)?;

        if iteration < repeat && !interval.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(interval) => {}
                () = token.cancelled() => {}
            }
        }
    }
    Ok(())
}

fn check_config(config: &FraudflowConfig, pretty: bool) -> Result<()> {
    build_pipeline(config, Arc::new(InMemoryCustomerDirectory::new()), Arc::new(NoOpTelemetry::new()))
        .context("Invalid pipeline configuration")?;
    if let Some(path) = &config.customers_file {
        let directory = InMemoryCustomerDirectory::from_json_file(path)
            .with_context(|| format!("Failed to load customers from {}", path.display()))?;
        info!(customers = directory.len(), "Customers file is valid");
    }
    build_exporter(&config.telemetry)?;
    print_json(config, pretty)
}

fn build_exporter(config: &TelemetryConfig) -> Result<Arc<dyn TelemetryExporter>> {
    let exporter: Arc<dyn TelemetryExporter> = match config.exporter {
        ExporterKind::Logging => Arc::new(LoggingExporter::default()),
        ExporterKind::JsonLines => {
            let path = config.path.as_deref().context("telemetry.path is required for json_lines")?;
            Arc::new(
                JsonLinesExporter::to_file(path)
                    .with_context(|| format!("Failed to open telemetry file {}", path.display()))?,
            )
        }
        #[cfg(feature = "http-export")]
        ExporterKind::Http => {
            let endpoint = config.endpoint.as_deref().context("telemetry.endpoint is required for http")?;
            Arc::new(fraudflow::telemetry::HttpExporter::new(
                endpoint,
                Duration::from_millis(config.export_timeout_ms),
            )?)
        }
        #[cfg(not(feature = "http-export"))]
        ExporterKind::Http => anyhow::bail!("the http exporter requires the http-export feature"),
        ExporterKind::None => Arc::new(NoOpExporter),
    };
    Ok(exporter)
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
        }
        None => {
            let mut text = String::new();
            std::io::stdin()
                .read_to_string(&mut text)
                .context("Failed to read stdin")?;
            Ok(text)
        }
    }
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}
