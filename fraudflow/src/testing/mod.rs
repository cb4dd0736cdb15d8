//! Testing utilities for fraudflow pipelines.
//!
//! This module provides:
//! - Scripted stages (recording, failing, fatal, slow, fixed score)
//! - In-memory and failing telemetry exporters
//! - Sample customers, transactions and a ready-made fraud pipeline
//! - Assertions over finished runs and emitted telemetry

mod assertions;
mod exporters;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_all_correlated, assert_decision, assert_spans_balanced, assert_stage_statuses,
};
pub use exporters::{FailingExporter, RecordingExporter};
pub use fixtures::{
    fraud_pipeline, large_purchase, sample_customers, sample_directory, small_purchase,
    unknown_customer_purchase, FIXED_TIMESTAMP,
};
pub use mocks::{FailingStage, FatalStage, RecordedCall, RecordingStage, ScoreStage, SlowStage};
