//! Workflow Execution Module
//!
//! Provides the executor that forges workflows, including middleware
//! chaining, compensation and failure aggregation.
//!
//! # Architecture
//!
//! - [`smith`]: The [`Smith`] executor and the [`StepTracker`] hooks
//! - [`step`]: Single-step execution, compensation and element pipelines

pub mod smith;
pub mod step;

pub use smith::{Smith, StepTracker};
pub use step::CompletedStep;
