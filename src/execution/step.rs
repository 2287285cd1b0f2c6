//! Individual Step Execution
//!
//! Helpers shared by the Smith and by for-each element pipelines:
//! - Running one operation through the middleware chain
//! - Reverse-order compensation of completed steps
//! - Running a short sequential pipeline with local rollback

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::{ForgeError, Result};
use crate::foundry::{DataValue, Foundry};
use crate::middleware::{Middleware, Next};
use crate::monitoring::{EventType, ForgeObserver};
use crate::operation::Operation;

/// An operation that succeeded in the current run, with its output and the
/// scoped foundry view it ran against.
#[derive(Clone)]
pub struct CompletedStep {
    pub operation: Arc<dyn Operation>,
    pub output: DataValue,
    pub scope: Foundry,
}

impl std::fmt::Debug for CompletedStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletedStep")
            .field("operation", &self.operation.name())
            .field("output", &self.output)
            .field("scope", &self.scope)
            .finish()
    }
}

/// A pipeline that stopped early.
///
/// `completed` holds the steps that finished and were not compensated. It is
/// only non-empty when the pipeline was canceled; the caller decides whether
/// those steps are rolled back.
#[derive(Debug)]
pub struct PipelineFailure {
    pub error: ForgeError,
    pub completed: Vec<CompletedStep>,
}

/// Publishes an event to every observer.
pub(crate) fn notify(observers: &[Arc<dyn ForgeObserver>], name: &str, event_type: EventType) {
    for observer in observers {
        observer.on_event(name, event_type);
    }
}

/// Executes a single operation through the middleware chain.
///
/// `scope` should be a fresh [`Foundry::scoped`] view per invocation.
/// Refuses to start when `cancel` has already fired.
pub async fn execute_step(
    operation: &dyn Operation,
    middleware: &[Arc<dyn Middleware>],
    input: DataValue,
    scope: &Foundry,
    cancel: &CancellationToken,
) -> Result<DataValue> {
    if cancel.is_cancelled() {
        return Err(ForgeError::canceled(operation.name()));
    }

    debug!(
        "Executing operation '{}' ({}) in scope {}",
        operation.name(),
        operation.id(),
        scope.scope()
    );
    Next::new(operation, middleware)
        .run(input, scope, cancel)
        .await
}

/// Compensates `completed` in reverse completion order.
///
/// Operations without compensation support are skipped. Failures are logged
/// and returned; they never stop the remaining compensations.
pub async fn compensate_completed(
    completed: &[CompletedStep],
    cancel: &CancellationToken,
    observers: &[Arc<dyn ForgeObserver>],
) -> Vec<ForgeError> {
    let mut errors = Vec::new();

    for step in completed.iter().rev() {
        let name = step.operation.name();

        if !step.operation.supports_compensation() {
            debug!("Operation '{}' does not support compensation - skipping", name);
            continue;
        }

        info!("Compensating operation '{}'", name);
        match step
            .operation
            .compensate(step.output.clone(), &step.scope, cancel)
            .await
        {
            Ok(()) => notify(observers, name, EventType::Compensated),
            Err(e) => {
                warn!("Compensation of '{}' failed: {}", name, e);
                notify(observers, name, EventType::CompensationFailed);
                errors.push(e);
            }
        }
    }

    errors
}

/// Drops the per-invocation state of every step.
pub fn release_completed(completed: &[CompletedStep]) {
    for step in completed {
        step.operation.release(&step.scope);
    }
}

/// Runs `operations` in order on one input, feeding each output forward.
///
/// On a business failure the steps that completed are compensated in
/// reverse order and released. On cancellation they are handed back
/// untouched in the [`PipelineFailure`].
pub async fn run_pipeline(
    operations: &[Arc<dyn Operation>],
    input: DataValue,
    foundry: &Foundry,
    cancel: &CancellationToken,
) -> std::result::Result<(DataValue, Vec<CompletedStep>), PipelineFailure> {
    let mut current = input;
    let mut completed = Vec::with_capacity(operations.len());

    for operation in operations {
        let scope = foundry.scoped();
        match execute_step(operation.as_ref(), &[], current.clone(), &scope, cancel).await {
            Ok(output) => {
                completed.push(CompletedStep {
                    operation: Arc::clone(operation),
                    output: output.clone(),
                    scope,
                });
                current = output;
            }
            Err(error) => {
                operation.release(&scope);
                if error.is_canceled() {
                    return Err(PipelineFailure { error, completed });
                }

                error!("Pipeline operation '{}' failed: {}", operation.name(), error);
                compensate_completed(&completed, cancel, &[]).await;
                release_completed(&completed);
                return Err(PipelineFailure {
                    error,
                    completed: Vec::new(),
                });
            }
        }
    }

    Ok((current, completed))
}
