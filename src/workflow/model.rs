//! Workflow Data Model
//!
//! A [`Workflow`] is an immutable, ordered list of operations plus a name,
//! description and version. Operation order is execution order. Workflows
//! are built once with [`super::WorkflowBuilder`] and can then be forged any
//! number of times against different foundries.

use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::operation::Operation;

/// An ordered, immutable sequence of operations.
#[derive(Clone)]
pub struct Workflow {
    id: Uuid,
    name: String,
    description: Option<String>,
    version: String,
    operations: Arc<[Arc<dyn Operation>]>,
}

impl Workflow {
    pub(crate) fn new(
        name: String,
        description: Option<String>,
        version: String,
        operations: Vec<Arc<dyn Operation>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            description,
            version,
            operations: operations.into(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Operations in execution order.
    pub fn operations(&self) -> &[Arc<dyn Operation>] {
        &self.operations
    }

    /// Names of the operations in execution order.
    pub fn operation_names(&self) -> Vec<&str> {
        self.operations.iter().map(|op| op.name()).collect()
    }

    /// Gets an operation by name (first match).
    pub fn get_operation(&self, name: &str) -> Option<&Arc<dyn Operation>> {
        self.operations.iter().find(|op| op.name() == name)
    }

    /// Returns the number of operations in the workflow.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if the workflow has no operations.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

impl fmt::Debug for Workflow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workflow")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("operations", &self.operation_names())
            .finish()
    }
}
