//! Pipeline building and execution.
//!
//! This module provides:
//! - A builder that validates stage ordering and timeouts
//! - The sequential executor that records results and decides runs

mod builder;
mod sequential;


pub use builder::SequentialPipelineBuilder;
pub use sequential::SequentialPipeline;
