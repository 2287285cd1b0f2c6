//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining and validating
//! workflows.
//!
//! # Structure
//!
//! - [`model`]: The immutable [`Workflow`]
//! - [`builder`]: Fluent [`WorkflowBuilder`]
//! - [`validator`]: Validation rules

pub mod builder;
pub mod model;
pub mod validator;

pub use builder::WorkflowBuilder;
pub use model::Workflow;
pub use validator::{validate_workflow, ValidationError};
