//! Recovery Runner
//!
//! Resumes a workflow from its last checkpoint and retries the first
//! incomplete step under a [`RecoveryPolicy`]:
//! - Steps recorded in the snapshot are never executed again
//! - A checkpoint is written after every successful step and after every
//!   failed attempt, so a retry after a restart sees what the attempt wrote
//! - Each retry starts from the failing step, after a backoff delay
//! - An exhausted budget ends in [`ForgeError::RecoveryExhausted`]

use std::sync::Arc;

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::error::{ForgeError, Result};
use crate::execution::Smith;
use crate::foundry::{DataValue, Foundry};
use crate::operation::cancellable_sleep;
use crate::persistence::{
    load_snapshot, CheckpointTracker, PersistenceKey, PersistenceProvider, Snapshot,
};
use crate::settings::RecoveryPolicy;
use crate::workflow::validator::require_unique_names;
use crate::workflow::Workflow;

/// Drives checkpointed runs and their retries.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use tokio_util::sync::CancellationToken;
/// use workforge::persistence::{JsonFileProvider, PersistenceKey};
/// use workforge::{Foundry, RecoveryRunner, Smith, WorkflowBuilder};
///
/// # async fn run() -> workforge::Result<()> {
/// let workflow = WorkflowBuilder::new("nightly")
///     .add_step("extract", |input, _| Ok(input))
///     .build()?;
///
/// let runner = RecoveryRunner::new(Smith::new(), Arc::new(JsonFileProvider::new(".workforge")));
/// let foundry = Foundry::new("nightly-2024-06-01");
///
/// runner
///     .resume_and_retry(
///         &workflow,
///         &foundry,
///         &PersistenceKey::derive(foundry.name()),
///         &PersistenceKey::derive(workflow.name()),
///         &CancellationToken::new(),
///     )
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RecoveryRunner {
    smith: Smith,
    provider: Arc<dyn PersistenceProvider>,
    policy: Option<RecoveryPolicy>,
}

impl RecoveryRunner {
    /// Creates a runner. The policy defaults to the foundry's settings.
    pub fn new(smith: Smith, provider: Arc<dyn PersistenceProvider>) -> Self {
        Self {
            smith,
            provider,
            policy: None,
        }
    }

    /// Uses `policy` instead of the foundry's recovery settings.
    pub fn with_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn provider(&self) -> &Arc<dyn PersistenceProvider> {
        &self.provider
    }

    fn policy_for(&self, foundry: &Foundry) -> RecoveryPolicy {
        self.policy
            .clone()
            .unwrap_or_else(|| foundry.settings().recovery.clone())
    }

    /// Runs `workflow` once with resume and per-step checkpointing.
    ///
    /// Steps already recorded for the key pair are skipped and the foundry
    /// is re-hydrated from the snapshot. Failures are returned unchanged.
    pub async fn forge_checkpointed(
        &self,
        workflow: &Workflow,
        input: DataValue,
        foundry: &Foundry,
        foundry_key: &PersistenceKey,
        workflow_key: &PersistenceKey,
        cancel: &CancellationToken,
    ) -> Result<DataValue> {
        require_unique_names(workflow).map_err(ForgeError::InvalidWorkflow)?;

        let snapshot = self.resume(foundry, foundry_key, workflow_key, cancel).await?;
        let tracker = CheckpointTracker::new(
            self.provider.as_ref(),
            foundry_key.clone(),
            workflow_key.clone(),
            snapshot.as_ref(),
            cancel,
        );

        self.smith
            .forge_tracked(workflow, input, foundry, cancel, &tracker)
            .await
    }

    /// Resumes `workflow` from its checkpoint and retries the first failing
    /// step until it succeeds or the policy's attempts run out.
    ///
    /// Cancellation and checkpoint write failures end the loop immediately.
    pub async fn resume_and_retry(
        &self,
        workflow: &Workflow,
        foundry: &Foundry,
        foundry_key: &PersistenceKey,
        workflow_key: &PersistenceKey,
        cancel: &CancellationToken,
    ) -> Result<DataValue> {
        require_unique_names(workflow).map_err(ForgeError::InvalidWorkflow)?;

        let policy = self.policy_for(foundry);
        let snapshot = self.resume(foundry, foundry_key, workflow_key, cancel).await?;
        let tracker = CheckpointTracker::new(
            self.provider.as_ref(),
            foundry_key.clone(),
            workflow_key.clone(),
            snapshot.as_ref(),
            cancel,
        );

        let mut failing: Option<String> = None;
        let mut attempts: u32 = 0;

        loop {
            let error = match self
                .smith
                .forge_tracked(workflow, DataValue::Null, foundry, cancel, &tracker)
                .await
            {
                Ok(output) => {
                    info!(
                        "Workflow '{}' recovered ({} step(s) checkpointed)",
                        workflow.name(),
                        tracker.completed_steps().len()
                    );
                    return Ok(output);
                }
                Err(e) if e.is_canceled() => return Err(e),
                Err(e @ ForgeError::PersistenceFailure { .. }) => return Err(e),
                Err(e) => e,
            };

            let step = error
                .step_name()
                .unwrap_or_else(|| workflow.name())
                .to_string();

            // A different step failing means the previous one made it through.
            if failing.as_deref() != Some(step.as_str()) {
                failing = Some(step.clone());
                attempts = 0;
            }
            attempts += 1;

            if attempts >= policy.max_attempts {
                warn!(
                    "Giving up on '{}' after {} attempt(s): {}",
                    step, attempts, error
                );
                return Err(ForgeError::RecoveryExhausted {
                    step,
                    attempts,
                    last: Box::new(error),
                });
            }

            let delay = policy.delay_for(attempts);
            warn!(
                "Step '{}' failed (attempt {}/{}), retrying in {:?}: {}",
                step, attempts, policy.max_attempts, delay, error
            );
            cancellable_sleep(delay, cancel, &step).await?;
        }
    }

    async fn resume(
        &self,
        foundry: &Foundry,
        foundry_key: &PersistenceKey,
        workflow_key: &PersistenceKey,
        cancel: &CancellationToken,
    ) -> Result<Option<Snapshot>> {
        let snapshot = load_snapshot(self.provider.as_ref(), foundry_key, workflow_key, cancel).await?;

        if let Some(snapshot) = &snapshot {
            foundry.restore(snapshot.properties.clone());
            info!(
                "Resuming foundry '{}' with {} completed step(s)",
                foundry.name(),
                snapshot.completed_steps.len()
            );
        }
        Ok(snapshot)
    }
}
