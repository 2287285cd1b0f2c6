//! Workflow Builder
//!
//! Fluent construction of [`Workflow`] definitions.

use std::sync::Arc;

use log::{info, warn};

use crate::error::{ForgeError, Result};
use crate::foundry::{DataValue, Foundry};
use crate::operation::{DelegateOperation, Operation};

use super::model::Workflow;
use super::validator::{validate_definition, ValidationError};

/// Default version assigned to new workflows.
pub const DEFAULT_VERSION: &str = "1.0.0";

/// Builds a [`Workflow`].
///
/// # Example
///
/// ```
/// use workforge::workflow::WorkflowBuilder;
///
/// let workflow = WorkflowBuilder::new("orders")
///     .description("Validate and charge an order")
///     .add_step("validate", |input, _foundry| Ok(input))
///     .add_step("charge", |input, foundry| {
///         foundry.set("charged", true);
///         Ok(input)
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(workflow.operation_names(), vec!["validate", "charge"]);
/// ```
pub struct WorkflowBuilder {
    name: String,
    description: Option<String>,
    version: String,
    operations: Vec<Arc<dyn Operation>>,
}

impl WorkflowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            description: None,
            version: DEFAULT_VERSION.to_string(),
            operations: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Appends an operation.
    pub fn add_operation(mut self, operation: impl Operation + 'static) -> Self {
        self.operations.push(Arc::new(operation));
        self
    }

    /// Appends an operation that is already shared.
    pub fn add_shared(mut self, operation: Arc<dyn Operation>) -> Self {
        self.operations.push(operation);
        self
    }

    /// Appends a synchronous closure step.
    pub fn add_step<F>(self, name: impl Into<String>, action: F) -> Self
    where
        F: Fn(DataValue, &Foundry) -> Result<DataValue> + Send + Sync + 'static,
    {
        self.add_operation(DelegateOperation::from_fn(name, action))
    }

    /// Validates and builds the workflow.
    ///
    /// Empty names and empty workflows are rejected. Duplicate operation
    /// names are allowed but logged, since they prevent checkpoint resume.
    pub fn build(self) -> Result<Workflow> {
        let mut fatal = Vec::new();

        for error in validate_definition(&self.name, &self.operations) {
            match error {
                ValidationError::DuplicateOperationName { .. } => warn!("{}", error),
                other => fatal.push(other.to_string()),
            }
        }

        if !fatal.is_empty() {
            return Err(ForgeError::InvalidWorkflow(fatal.join("\n")));
        }

        info!(
            "Workflow '{}' built: {} operations",
            self.name,
            self.operations.len()
        );

        Ok(Workflow::new(
            self.name,
            self.description,
            self.version,
            self.operations,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::DelayOperation;
    use std::time::Duration;

    #[test]
    fn test_builder_preserves_order() {
        let workflow = WorkflowBuilder::new("pipeline")
            .version("2.1")
            .add_step("first", |input, _| Ok(input))
            .add_operation(DelayOperation::new("second", Duration::from_millis(1)))
            .add_step("third", |input, _| Ok(input))
            .build()
            .unwrap();

        assert_eq!(workflow.version(), "2.1");
        assert_eq!(workflow.operation_names(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_builder_rejects_empty() {
        let err = WorkflowBuilder::new("pipeline").build().unwrap_err();
        assert!(matches!(err, ForgeError::InvalidWorkflow(ref msg) if msg.contains("no operations")));
    }

    #[test]
    fn test_builder_rejects_blank_name() {
        let err = WorkflowBuilder::new("   ")
            .add_step("a", |input, _| Ok(input))
            .build()
            .unwrap_err();
        assert!(matches!(err, ForgeError::InvalidWorkflow(_)));
    }

    #[test]
    fn test_builder_allows_duplicate_names() {
        let workflow = WorkflowBuilder::new("pipeline")
            .add_step("same", |input, _| Ok(input))
            .add_step("same", |input, _| Ok(input))
            .build()
            .unwrap();

        assert_eq!(workflow.len(), 2);
        assert_ne!(workflow.operations()[0].id(), workflow.operations()[1].id());
    }

    #[test]
    fn test_default_version() {
        let workflow = WorkflowBuilder::new("pipeline")
            .add_step("a", |input, _| Ok(input))
            .build()
            .unwrap();
        assert_eq!(workflow.version(), DEFAULT_VERSION);
        assert!(workflow.description().is_none());
    }
}
