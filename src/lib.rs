//! WorkForge - In-Process Workflow Orchestration
//!
//! Sequences named operations into workflows and forges them against a
//! shared execution context, with timeouts, cooperative cancellation,
//! compensating rollback, bounded fan-out over collections and
//! checkpoint-based recovery across restarts.
//!
//! # Architecture
//!
//! The library is organized into these modules:
//!
//! - [`foundry`]: The per-run execution context and its property bag
//! - [`operation`]: The [`Operation`] trait and built-in operations
//! - [`workflow`]: Workflow definitions, builder and validation
//! - [`middleware`]: Wrappers around operation execution
//! - [`execution`]: The [`Smith`] executor
//! - [`persistence`]: Checkpoint snapshots and providers
//! - [`recovery`]: Resume-and-retry on top of checkpoints
//! - [`monitoring`]: Lifecycle events and execution timeline
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use workforge::middleware::TimeoutMiddleware;
//! use workforge::{DataValue, Foundry, Smith, WorkflowBuilder};
//!
//! # async fn run() -> workforge::Result<()> {
//! let workflow = WorkflowBuilder::new("checkout")
//!     .add_step("price", |_, foundry| {
//!         foundry.set("total", 42);
//!         Ok(DataValue::Int(42))
//!     })
//!     .build()?;
//!
//! let smith = Smith::new().with_middleware(TimeoutMiddleware::new(Duration::from_secs(10)));
//! let foundry = Foundry::new("order-1");
//!
//! let output = smith.forge(&workflow, &foundry, &CancellationToken::new()).await?;
//! assert_eq!(output, DataValue::Int(42));
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod execution;
pub mod foundry;
pub mod middleware;
pub mod monitoring;
pub mod operation;
pub mod persistence;
pub mod recovery;
pub mod settings;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types
pub use error::{ForgeError, Result};
pub use execution::{Smith, StepTracker};
pub use foundry::{DataValue, Foundry};
pub use operation::Operation;
pub use recovery::RecoveryRunner;
pub use settings::{ForgeSettings, RecoveryPolicy};
pub use workflow::{Workflow, WorkflowBuilder};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use crate::persistence::{InMemoryProvider, PersistenceKey};

    #[test]
    fn test_module_exports_builder() {
        let workflow = WorkflowBuilder::new("exports")
            .add_step("noop", |input, _| Ok(input))
            .build()
            .unwrap();
        assert_eq!(workflow.name(), "exports");
        assert_eq!(workflow.len(), 1);
    }

    #[test]
    fn test_module_exports_foundry() {
        let foundry = Foundry::with_settings("exports", ForgeSettings::default());
        assert!(foundry.is_empty());
        assert_eq!(foundry.settings().recovery, RecoveryPolicy::default());
    }

    #[tokio::test]
    async fn test_module_exports_run_a_checkpointed_workflow() {
        let workflow: Workflow = WorkflowBuilder::new("exports")
            .add_step("double", |input, _| match input {
                DataValue::Int(n) => Ok(DataValue::Int(n * 2)),
                _ => Err(ForgeError::failure("double", "not an int")),
            })
            .build()
            .unwrap();
        let provider = Arc::new(InMemoryProvider::new());
        let runner = RecoveryRunner::new(Smith::new(), provider.clone());
        let foundry = Foundry::new("exports");

        let output: Result<DataValue> = runner
            .forge_checkpointed(
                &workflow,
                DataValue::Int(21),
                &foundry,
                &PersistenceKey::derive("exports"),
                &PersistenceKey::derive(workflow.name()),
                &CancellationToken::new(),
            )
            .await;
        assert_eq!(output.unwrap(), DataValue::Int(42));
        assert_eq!(provider.len(), 1);

        let ops: &[Arc<dyn Operation>] = workflow.operations();
        assert_eq!(ops[0].name(), "double");
    }
}
