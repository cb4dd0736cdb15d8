//! Core domain model types for fraudflow.
//!
//! This module contains the data flowing through a run:
//! - The immutable input transaction
//! - Stage outcomes and recorded stage results
//! - The append-only pipeline run and its final decision

mod decision;
mod outcome;
mod result;
mod run;
mod status;
mod transaction;

pub use decision::{Decision, Outcome, ReasonCode};
pub use outcome::StageOutcome;
pub use result::StageResult;
pub use run::{AbortReason, PipelineRun};
pub use status::{RunStatus, StageStatus};
pub use transaction::Transaction;
