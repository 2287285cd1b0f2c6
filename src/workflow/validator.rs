//! Workflow Validation
//!
//! Checks a workflow definition before it is built or resumed:
//! - Workflow name is not empty
//! - Workflow has at least one operation
//! - Every operation has a name
//! - Operation names are unique (required for checkpoint-based resume)

use std::collections::HashSet;
use std::sync::Arc;

use log::{debug, warn};

use crate::operation::Operation;

use super::model::Workflow;

/// Validation error types for user-friendly error messages.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyWorkflowName,
    EmptyWorkflow(String),
    EmptyOperationName { workflow: String, index: usize },
    DuplicateOperationName { workflow: String, name: String },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyWorkflowName => write!(f, "Workflow has empty or whitespace-only name"),
            Self::EmptyWorkflow(name) => write!(f, "Workflow '{}' has no operations", name),
            Self::EmptyOperationName { workflow, index } => {
                write!(f, "Workflow '{}': operation #{} has no name", workflow, index + 1)
            }
            Self::DuplicateOperationName { workflow, name } => {
                write!(f, "Workflow '{}': operation name '{}' is used more than once", workflow, name)
            }
        }
    }
}

/// Validates the parts of a workflow definition.
///
/// Duplicate names are reported but are only fatal for resumable runs; see
/// [`require_unique_names`].
pub fn validate_definition(name: &str, operations: &[Arc<dyn Operation>]) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if name.trim().is_empty() {
        errors.push(ValidationError::EmptyWorkflowName);
    }

    if operations.is_empty() {
        errors.push(ValidationError::EmptyWorkflow(name.to_string()));
        return errors;
    }

    let mut seen: HashSet<&str> = HashSet::new();
    for (index, op) in operations.iter().enumerate() {
        if op.name().trim().is_empty() {
            errors.push(ValidationError::EmptyOperationName {
                workflow: name.to_string(),
                index,
            });
            continue;
        }

        if !seen.insert(op.name()) {
            errors.push(ValidationError::DuplicateOperationName {
                workflow: name.to_string(),
                name: op.name().to_string(),
            });
        }

        if op.supports_compensation() {
            debug!("Operation '{}' supports compensation", op.name());
        }
    }

    errors
}

/// Validates a built workflow.
pub fn validate_workflow(workflow: &Workflow) -> Vec<ValidationError> {
    validate_definition(workflow.name(), workflow.operations())
}

/// Fails unless every operation name is unique.
///
/// Checkpoints record completed steps by name, so resume needs names that
/// identify exactly one operation.
pub fn require_unique_names(workflow: &Workflow) -> Result<(), String> {
    let duplicates: Vec<String> = validate_workflow(workflow)
        .into_iter()
        .filter(|e| matches!(e, ValidationError::DuplicateOperationName { .. }))
        .map(|e| e.to_string())
        .collect();

    if duplicates.is_empty() {
        Ok(())
    } else {
        warn!("Workflow '{}' cannot be resumed: {}", workflow.name(), duplicates.join("; "));
        Err(duplicates.join("\n"))
    }
}
