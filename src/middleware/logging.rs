//! Logging Middleware
//!
//! Emits a record when each operation starts and when it finishes, with the
//! elapsed time, through the foundry's logger.

use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::foundry::{DataValue, Foundry};
use crate::operation::Operation;

use super::{Middleware, Next};

#[derive(Debug, Clone, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn handle(
        &self,
        operation: &dyn Operation,
        input: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
        next: Next<'_>,
    ) -> Result<DataValue> {
        let logger = foundry.logger();
        let started = Instant::now();
        logger.info(format!("Starting operation: {}", operation.name()));

        let result = next.run(input, foundry, cancel).await;

        match &result {
            Ok(_) => logger.info(format!(
                "Operation '{}' completed in {:.2?}",
                operation.name(),
                started.elapsed()
            )),
            Err(e) => logger.error(format!(
                "Operation '{}' failed after {:.2?}: {}",
                operation.name(),
                started.elapsed(),
                e
            )),
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::error::ForgeError;
    use crate::operation::DelegateOperation;

    #[tokio::test]
    async fn test_logging_is_transparent() {
        let _ = env_logger::builder().is_test(true).try_init();

        let ok = DelegateOperation::from_fn("ok", |input, _| Ok(input));
        let bad = DelegateOperation::from_fn("bad", |_, _| Err(ForgeError::failure("bad", "nope")));
        let middleware: Vec<Arc<dyn Middleware>> = vec![Arc::new(LoggingMiddleware::new())];
        let foundry = Foundry::new("test");
        let cancel = CancellationToken::new();

        let output = Next::new(&ok, &middleware)
            .run(DataValue::Int(3), &foundry, &cancel)
            .await
            .unwrap();
        assert_eq!(output, DataValue::Int(3));

        let err = Next::new(&bad, &middleware)
            .run(DataValue::Null, &foundry, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::OperationFailure { .. }));
    }
}
