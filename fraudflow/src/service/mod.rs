//! The JSON decision surface.
//!
//! [`DecisionService`] turns camelCase request documents into pipeline
//! runs and always answers with a structured [`DecisionResponse`], even for
//! malformed input. [`BatchRunner`] drives many requests concurrently.

mod batch;
mod decision;
mod request;

pub use batch::{BatchRunner, BatchSummary};
pub use decision::{build_pipeline, DecisionService};
pub use request::{DecisionRequest, DecisionResponse, ResponseStatus, StageSummary};
