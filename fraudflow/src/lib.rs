//! # Fraudflow
//!
//! A sequential fraud-detection decision pipeline with per-stage telemetry.
//!
//! Each transaction runs through an ordered list of stages
//! (`customer_data -> risk_analysis -> fraud_alert` by default). Every
//! stage reads the results recorded before it, and a [`DecisionPolicy`]
//! turns the recorded risk score into `approved`, `investigate` or
//! `blocked`. All spans, metrics and events of one run share a
//! correlation id and flow through a [`TelemetryEmitter`] to a pluggable
//! exporter.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fraudflow::prelude::*;
//!
//! let pipeline = SequentialPipelineBuilder::new()
//!     .stage(Arc::new(CustomerDataStage::new(directory)))?
//!     .stage(Arc::new(RiskAnalysisStage::new()))?
//!     .stage(Arc::new(FraudAlertStage::new()))?
//!     .with_policy(DecisionPolicy::new(0.75, 0.40)?)
//!     .build()?;
//!
//! let run = pipeline.run(Transaction::new("tx-1", "cust-1001", 20.0)).await?;
//! println!("{:?}", run.decision());
//! ```
//!
//! [`DecisionPolicy`]: policy::DecisionPolicy
//! [`TelemetryEmitter`]: telemetry::TelemetryEmitter

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod service;
pub mod stages;
pub mod telemetry;
pub mod testing;

pub use errors::{FraudflowError, Result};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::config::{FraudflowConfig, PipelineConfig, StageConfig};
    pub use crate::core::{
        AbortReason, Decision, Outcome, PipelineRun, ReasonCode, RunStatus, StageOutcome,
        StageResult, StageStatus, Transaction,
    };
    pub use crate::errors::{ConfigError, FatalFailure, FraudflowError, RunStateError};
    pub use crate::pipeline::{SequentialPipeline, SequentialPipelineBuilder};
    pub use crate::policy::{AbortFallback, DecisionPolicy};
    pub use crate::service::{BatchRunner, DecisionRequest, DecisionResponse, DecisionService};
    pub use crate::stages::{
        CustomerDataStage, CustomerDirectory, FraudAlertStage, InMemoryCustomerDirectory,
        PipelineStage, RiskAnalysisStage, StageContext,
    };
    pub use crate::telemetry::{
        ExportingTelemetry, InMemoryTelemetry, NoOpTelemetry, TelemetryEmitter, TelemetryExporter,
    };
    pub use std::sync::Arc;
}
