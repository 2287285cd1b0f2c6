//! Operations
//!
//! An [`Operation`] is a named unit of work with an optional compensating
//! action. Workflows are ordered lists of operations; the Smith drives them.
//!
//! - [`delegate`]: Closure-backed operations
//! - [`builtin`]: Delay, logging and conditional operations
//! - [`for_each`]: Bounded-concurrency fan-out over a collection

pub mod builtin;
pub mod delegate;
pub mod for_each;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ForgeError, Result};
use crate::foundry::{DataValue, Foundry};

pub use builtin::{ConditionalOperation, DelayOperation, LoggingOperation};
pub use delegate::DelegateOperation;
pub use for_each::ForEachOperation;

/// Process-unique operation identifier, fixed at construction.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(Uuid);

impl OperationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work in a workflow.
///
/// Implementations must observe `cancel` at their suspension points and
/// return [`ForgeError::Canceled`] when it fires.
#[async_trait]
pub trait Operation: Send + Sync {
    /// Identifier assigned at construction.
    fn id(&self) -> OperationId;

    /// Human-readable name; recorded in checkpoints and errors.
    fn name(&self) -> &str;

    /// Whether [`Operation::compensate`] undoes anything.
    fn supports_compensation(&self) -> bool {
        false
    }

    /// Runs the operation.
    async fn execute(
        &self,
        input: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<DataValue>;

    /// Reverses a previous successful [`Operation::execute`] given its output.
    async fn compensate(
        &self,
        _output: DataValue,
        _foundry: &Foundry,
        _cancel: &CancellationToken,
    ) -> Result<()> {
        Ok(())
    }

    /// Drops any state kept for the invocation that ran on `foundry`, once
    /// the run has ended. State an operation keeps between `execute` and
    /// `compensate` should be keyed by [`Foundry::scope`].
    fn release(&self, _foundry: &Foundry) {}
}

/// Sleeps for `duration` unless `cancel` fires first.
pub async fn cancellable_sleep(
    duration: Duration,
    cancel: &CancellationToken,
    step: &str,
) -> Result<()> {
    tokio::select! {
        _ = cancel.cancelled() => Err(ForgeError::canceled(step)),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_ids_are_unique() {
        let a = OperationId::new();
        let b = OperationId::new();
        assert_ne!(a, b);
        assert_eq!(a.to_string().len(), 36);
    }

    #[tokio::test]
    async fn test_cancellable_sleep_completes() {
        let cancel = CancellationToken::new();
        let result = cancellable_sleep(Duration::from_millis(5), &cancel, "nap").await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_cancellable_sleep_observes_cancel() {
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = cancellable_sleep(Duration::from_secs(60), &cancel, "nap")
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::Canceled { ref step } if step == "nap"));
    }
}
