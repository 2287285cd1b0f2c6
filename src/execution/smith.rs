//! Workflow Executor
//!
//! The [`Smith`] forges a workflow's operations, in order, against a
//! [`Foundry`]:
//! - Each operation runs through the middleware chain
//! - Each output becomes the next operation's input
//! - Fail-fast mode compensates completed steps in reverse on failure
//! - Continue-on-error mode runs every step and aggregates failures
//! - An optional [`StepTracker`] skips already-done steps and persists
//!   progress after every success and every failed attempt

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::{ForgeError, Result};
use crate::foundry::{DataValue, Foundry};
use crate::middleware::{Middleware, TimeoutMiddleware};
use crate::monitoring::{EventType, ForgeObserver};
use crate::settings::ForgeSettings;
use crate::workflow::Workflow;

use super::step::{compensate_completed, execute_step, notify, release_completed, CompletedStep};

/// Hooks that let a caller resume and checkpoint a run.
#[async_trait]
pub trait StepTracker: Send + Sync {
    /// True when the named step finished in an earlier run.
    fn is_completed(&self, name: &str) -> bool;

    /// Called after a step succeeds, before the next one starts.
    async fn step_completed(&self, name: &str, foundry: &Foundry) -> Result<()>;

    /// Called after a step fails for any reason other than cancellation, so
    /// whatever the attempt committed to the bag can be recorded.
    async fn step_failed(&self, _name: &str, _foundry: &Foundry) -> Result<()> {
        Ok(())
    }

    /// Whether a fail-fast failure should compensate completed steps.
    fn compensates(&self) -> bool {
        true
    }
}

/// Tracker for plain runs: nothing is skipped, nothing is recorded.
struct Untracked;

#[async_trait]
impl StepTracker for Untracked {
    fn is_completed(&self, _name: &str) -> bool {
        false
    }

    async fn step_completed(&self, _name: &str, _foundry: &Foundry) -> Result<()> {
        Ok(())
    }
}

/// Workflow executor.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use workforge::{Foundry, Smith, WorkflowBuilder};
/// use workforge::middleware::TimeoutMiddleware;
///
/// # async fn run() -> workforge::Result<()> {
/// let workflow = WorkflowBuilder::new("orders")
///     .add_step("validate", |input, _| Ok(input))
///     .build()?;
///
/// let smith = Smith::new().with_middleware(TimeoutMiddleware::new(Duration::from_secs(5)));
/// let foundry = Foundry::new("order-42");
///
/// smith.forge(&workflow, &foundry, &CancellationToken::new()).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct Smith {
    middleware: Vec<Arc<dyn Middleware>>,
    observers: Vec<Arc<dyn ForgeObserver>>,
}

impl Smith {
    /// Creates a Smith with no middleware.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a Smith with the middleware implied by `settings`.
    pub fn from_settings(settings: &ForgeSettings) -> Self {
        let smith = Self::new();
        match settings.operation_timeout {
            Some(timeout) => smith.with_middleware(TimeoutMiddleware::new(timeout)),
            None => smith,
        }
    }

    /// Appends a middleware layer. Layers added first are outermost.
    pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Appends an already shared middleware layer.
    pub fn with_shared_middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    /// Registers a lifecycle observer.
    pub fn with_observer(mut self, observer: Arc<dyn ForgeObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    /// Names of the installed middleware layers, outermost first.
    pub fn middleware_names(&self) -> Vec<&str> {
        self.middleware.iter().map(|m| m.name()).collect()
    }

    /// Forges `workflow` with a null initial input.
    pub async fn forge(
        &self,
        workflow: &Workflow,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<DataValue> {
        self.forge_with_input(workflow, DataValue::Null, foundry, cancel)
            .await
    }

    /// Forges `workflow`, passing `input` to the first operation.
    pub async fn forge_with_input(
        &self,
        workflow: &Workflow,
        input: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<DataValue> {
        self.forge_tracked(workflow, input, foundry, cancel, &Untracked)
            .await
    }

    /// Forges `workflow` under the control of `tracker`.
    ///
    /// Steps the tracker reports as completed are skipped and pass their
    /// input through. A `step_completed` error (a failed checkpoint write)
    /// stops the run immediately and is returned as-is; nothing is rolled
    /// back. A `step_failed` error is only logged.
    pub async fn forge_tracked(
        &self,
        workflow: &Workflow,
        input: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
        tracker: &dyn StepTracker,
    ) -> Result<DataValue> {
        let started = Instant::now();
        info!(
            "Starting workflow '{}' on foundry '{}' ({} operations, continue on error: {})",
            workflow.name(),
            foundry.name(),
            workflow.len(),
            foundry.settings().continue_on_error
        );
        notify(&self.observers, workflow.name(), EventType::WorkflowStarted);

        let mut invocations = Vec::with_capacity(workflow.len());
        let result = self
            .run_operations(workflow, input, foundry, cancel, tracker, &mut invocations)
            .await;

        release_completed(&invocations);

        match &result {
            Ok(_) => {
                info!(
                    "Workflow '{}' completed successfully in {:.2?}",
                    workflow.name(),
                    started.elapsed()
                );
                notify(&self.observers, workflow.name(), EventType::WorkflowCompleted);
            }
            Err(e) => {
                error!("Workflow '{}' failed: {}", workflow.name(), e);
                notify(&self.observers, workflow.name(), EventType::WorkflowFailed);
            }
        }

        result
    }

    /// Runs every operation. Successful invocations are recorded in
    /// `invocations` for the caller to release; failed ones are released
    /// on the spot.
    async fn run_operations(
        &self,
        workflow: &Workflow,
        input: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
        tracker: &dyn StepTracker,
        invocations: &mut Vec<CompletedStep>,
    ) -> Result<DataValue> {
        let continue_on_error = foundry.settings().continue_on_error;
        let mut current = input;
        let mut completed: Vec<CompletedStep> = Vec::new();
        let mut failures: Vec<ForgeError> = Vec::new();

        for operation in workflow.operations() {
            let name = operation.name();

            if tracker.is_completed(name) {
                debug!("Operation '{}' already completed - skipping", name);
                notify(&self.observers, name, EventType::Skipped);
                continue;
            }

            if cancel.is_cancelled() {
                warn!("Workflow '{}' canceled before '{}'", workflow.name(), name);
                return Err(ForgeError::canceled(name));
            }

            info!("Starting operation: {}", name);
            notify(&self.observers, name, EventType::Started);

            let scope = foundry.scoped();
            let outcome = execute_step(
                operation.as_ref(),
                &self.middleware,
                current.clone(),
                &scope,
                cancel,
            )
            .await;

            match outcome {
                Ok(output) => {
                    info!("Operation '{}' completed successfully", name);
                    notify(&self.observers, name, EventType::Completed);

                    let step = CompletedStep {
                        operation: Arc::clone(operation),
                        output: output.clone(),
                        scope,
                    };
                    invocations.push(step.clone());
                    tracker.step_completed(name, foundry).await?;

                    completed.push(step);
                    current = output;
                }
                Err(e) if e.is_canceled() => {
                    warn!("Operation '{}' canceled", name);
                    notify(&self.observers, name, EventType::Failed);
                    operation.release(&scope);
                    return Err(e);
                }
                Err(e) => {
                    error!("Operation '{}' failed: {}", name, e);
                    notify(&self.observers, name, EventType::Failed);
                    operation.release(&scope);

                    if let Err(record_error) = tracker.step_failed(name, foundry).await {
                        warn!(
                            "Could not record failed attempt of '{}': {}",
                            name, record_error
                        );
                    }

                    if continue_on_error {
                        failures.push(e);
                        continue;
                    }

                    let compensation_errors = if tracker.compensates() {
                        compensate_completed(&completed, cancel, &self.observers).await
                    } else {
                        Vec::new()
                    };

                    return Err(ForgeError::StepFailed {
                        step: name.to_string(),
                        source: Box::new(e),
                        compensation_errors,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(current)
        } else {
            warn!(
                "Workflow '{}' finished with {} failed operation(s)",
                workflow.name(),
                failures.len()
            );
            Err(ForgeError::AggregateFailure {
                step: workflow.name().to_string(),
                errors: failures,
                output: None,
            })
        }
    }
}
