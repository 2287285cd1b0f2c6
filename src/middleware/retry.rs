//! Retry Middleware
//!
//! Re-runs the rest of the chain after business failures and timeouts, up
//! to a fixed number of extra attempts. Cancellation is never retried.

use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::foundry::{DataValue, Foundry};
use crate::operation::{cancellable_sleep, Operation};

use super::{Middleware, Next};

/// Retries a failed execution with a fixed delay between attempts.
#[derive(Debug, Clone)]
pub struct RetryMiddleware {
    max_retries: u32,
    delay: Duration,
}

impl RetryMiddleware {
    /// `max_retries` extra attempts after the first, waiting `delay` between.
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }
}

#[async_trait]
impl Middleware for RetryMiddleware {
    fn name(&self) -> &str {
        "retry"
    }

    async fn handle(
        &self,
        operation: &dyn Operation,
        input: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
        next: Next<'_>,
    ) -> Result<DataValue> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match next.run(input.clone(), foundry, cancel).await {
                Ok(output) => return Ok(output),
                Err(e) if e.is_canceled() || attempt > self.max_retries => return Err(e),
                Err(e) => {
                    warn!(
                        "Operation '{}' attempt {} failed: {}. Retrying in {:?}",
                        operation.name(),
                        attempt,
                        e,
                        self.delay
                    );
                    cancellable_sleep(self.delay, cancel, operation.name()).await?;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::error::ForgeError;
    use crate::operation::DelegateOperation;

    fn flaky(failures: i64) -> DelegateOperation {
        DelegateOperation::from_fn("flaky", move |input, foundry| {
            let calls = foundry.get_or_default("calls", 0i64)? + 1;
            foundry.set("calls", calls);
            if calls <= failures {
                Err(ForgeError::failure("flaky", format!("call {}", calls)))
            } else {
                Ok(input)
            }
        })
    }

    #[tokio::test]
    async fn test_retry_until_success() {
        let op = flaky(2);
        let middleware: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(RetryMiddleware::new(3, Duration::from_millis(1)))];
        let foundry = Foundry::new("test");
        let cancel = CancellationToken::new();

        Next::new(&op, &middleware)
            .run(DataValue::Null, &foundry, &cancel)
            .await
            .unwrap();
        assert_eq!(foundry.get_as::<i64>("calls").unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let op = flaky(10);
        let middleware: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(RetryMiddleware::new(2, Duration::from_millis(1)))];
        let foundry = Foundry::new("test");
        let cancel = CancellationToken::new();

        let err = Next::new(&op, &middleware)
            .run(DataValue::Null, &foundry, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::OperationFailure { .. }));
        assert_eq!(foundry.get_as::<i64>("calls").unwrap(), Some(3));
    }

    #[tokio::test]
    async fn test_cancel_is_not_retried() {
        let op = DelegateOperation::from_fn("stop", |_, foundry| {
            foundry.push("calls", 1)?;
            Err(ForgeError::canceled("stop"))
        });
        let middleware: Vec<Arc<dyn Middleware>> =
            vec![Arc::new(RetryMiddleware::new(5, Duration::from_millis(1)))];
        let foundry = Foundry::new("test");
        let cancel = CancellationToken::new();

        let err = Next::new(&op, &middleware)
            .run(DataValue::Null, &foundry, &cancel)
            .await
            .unwrap_err();
        assert!(err.is_canceled());
        assert_eq!(foundry.get_as::<Vec<DataValue>>("calls").unwrap().map(|v| v.len()), Some(1));
    }
}
