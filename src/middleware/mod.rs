//! Middleware Chain
//!
//! Middleware wraps the execution of every top-level operation. The chain
//! is an ordered slice (outermost first); each layer receives a [`Next`]
//! handle that runs the rest of the chain and finally the operation itself.
//!
//! - [`timeout`]: Races execution against a timer
//! - [`logging`]: Start/finish/elapsed records per operation
//! - [`retry`]: Bounded retries of failed executions

pub mod logging;
pub mod retry;
pub mod timeout;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::foundry::{DataValue, Foundry};
use crate::operation::Operation;

pub use logging::LoggingMiddleware;
pub use retry::RetryMiddleware;
pub use timeout::TimeoutMiddleware;

/// A wrapper around operation execution.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Name used in log records.
    fn name(&self) -> &str;

    /// Handles one execution. Call `next.run(..)` to continue the chain.
    async fn handle(
        &self,
        operation: &dyn Operation,
        input: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
        next: Next<'_>,
    ) -> Result<DataValue>;
}

/// The remainder of a middleware chain.
///
/// `Next` is `Copy`, so a layer may run the rest of the chain more than once.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    operation: &'a dyn Operation,
    chain: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    /// Starts a chain over `middleware` that ends in `operation`.
    pub fn new(operation: &'a dyn Operation, middleware: &'a [Arc<dyn Middleware>]) -> Self {
        Self {
            operation,
            chain: middleware,
        }
    }

    /// Runs the remaining layers, then the operation.
    pub async fn run(
        self,
        input: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<DataValue> {
        match self.chain.split_first() {
            Some((layer, rest)) => {
                let next = Next {
                    operation: self.operation,
                    chain: rest,
                };
                layer
                    .handle(self.operation, input, foundry, cancel, next)
                    .await
            }
            None => self.operation.execute(input, foundry, cancel).await,
        }
    }
}
