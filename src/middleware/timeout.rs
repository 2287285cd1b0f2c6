//! Timeout Middleware
//!
//! Races the rest of the chain against a timer. When the timer wins, the
//! in-flight execution is signaled through a child cancellation token and a
//! [`ForgeError::Timeout`] is reported without waiting for it to wind down.

use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use tokio_util::sync::CancellationToken;

use crate::error::{ForgeError, Result};
use crate::foundry::{DataValue, Foundry};
use crate::operation::Operation;

use super::{Middleware, Next};

/// Fails an operation that runs longer than a fixed duration.
#[derive(Debug, Clone)]
pub struct TimeoutMiddleware {
    duration: Duration,
}

impl TimeoutMiddleware {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[async_trait]
impl Middleware for TimeoutMiddleware {
    fn name(&self) -> &str {
        "timeout"
    }

    async fn handle(
        &self,
        operation: &dyn Operation,
        input: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
        next: Next<'_>,
    ) -> Result<DataValue> {
        // Child token: our cancel reaches the operation, the caller's still does too
        let scoped = cancel.child_token();

        tokio::select! {
            result = next.run(input, foundry, &scoped) => result,
            _ = tokio::time::sleep(self.duration) => {
                scoped.cancel();
                warn!(
                    "Operation '{}' exceeded timeout of {:?}",
                    operation.name(),
                    self.duration
                );
                Err(ForgeError::Timeout {
                    step: operation.name().to_string(),
                    duration: self.duration,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::operation::{DelayOperation, DelegateOperation};

    fn chain(duration: Duration) -> Vec<Arc<dyn Middleware>> {
        vec![Arc::new(TimeoutMiddleware::new(duration))]
    }

    #[tokio::test]
    async fn test_slow_operation_times_out() {
        let op = DelayOperation::new("slow", Duration::from_secs(5));
        let middleware = chain(Duration::from_millis(20));
        let foundry = Foundry::new("test");
        let cancel = CancellationToken::new();

        let err = Next::new(&op, &middleware)
            .run(DataValue::Null, &foundry, &cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, ForgeError::Timeout { ref step, .. } if step == "slow"));
        assert!(!err.is_canceled());
        assert!(!cancel.is_cancelled(), "caller token must stay untouched");
    }

    #[tokio::test]
    async fn test_fast_operation_completes() {
        let op = DelayOperation::new("fast", Duration::from_millis(5));
        let middleware = chain(Duration::from_secs(5));
        let foundry = Foundry::new("test");
        let cancel = CancellationToken::new();

        let output = Next::new(&op, &middleware)
            .run(DataValue::Int(9), &foundry, &cancel)
            .await
            .unwrap();
        assert_eq!(output, DataValue::Int(9));
    }

    #[tokio::test]
    async fn test_caller_cancel_reports_canceled() {
        let op = DelayOperation::new("slow", Duration::from_secs(5));
        let middleware = chain(Duration::from_secs(2));
        let foundry = Foundry::new("test");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = Next::new(&op, &middleware)
            .run(DataValue::Null, &foundry, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_canceled());
        assert!(!err.is_timeout());
    }

    #[tokio::test]
    async fn test_timeout_signals_operation() {
        let observed = CancellationToken::new();
        let seen = observed.clone();
        let op = DelegateOperation::new("watcher", move |_input, _foundry, cancel: CancellationToken| {
            let seen = seen.clone();
            async move {
                tokio::spawn(async move {
                    cancel.cancelled().await;
                    seen.cancel();
                });
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(DataValue::Null)
            }
        });

        let middleware = chain(Duration::from_millis(10));
        let foundry = Foundry::new("test");
        let cancel = CancellationToken::new();

        let err = Next::new(&op, &middleware)
            .run(DataValue::Null, &foundry, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_timeout());

        let signaled = tokio::time::timeout(Duration::from_secs(1), observed.cancelled()).await;
        assert!(signaled.is_ok(), "operation should observe the timeout cancel");
    }
}
