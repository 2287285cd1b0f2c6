//! Closure-Backed Operations
//!
//! [`DelegateOperation`] turns async closures into operations, which is how
//! most workflow steps are written in practice.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::foundry::{DataValue, Foundry};

use super::{Operation, OperationId};

/// Boxed future returned by an execute closure.
pub type ExecuteFuture = Pin<Box<dyn Future<Output = Result<DataValue>> + Send>>;

/// Boxed future returned by a compensate closure.
pub type CompensateFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

type ExecuteFn = dyn Fn(DataValue, Foundry, CancellationToken) -> ExecuteFuture + Send + Sync;
type CompensateFn = dyn Fn(DataValue, Foundry, CancellationToken) -> CompensateFuture + Send + Sync;

/// An operation whose behavior is supplied as closures.
///
/// # Example
///
/// ```
/// use workforge::foundry::DataValue;
/// use workforge::operation::DelegateOperation;
///
/// let reserve = DelegateOperation::new("ReserveStock", |input, foundry, _cancel| async move {
///     foundry.set("reserved", true);
///     Ok(input)
/// })
/// .with_compensation(|_output, foundry, _cancel| async move {
///     foundry.remove("reserved");
///     Ok(())
/// });
/// ```
pub struct DelegateOperation {
    id: OperationId,
    name: String,
    execute: Arc<ExecuteFn>,
    compensate: Option<Arc<CompensateFn>>,
}

impl DelegateOperation {
    /// Creates an operation from an async closure.
    pub fn new<F, Fut>(name: impl Into<String>, execute: F) -> Self
    where
        F: Fn(DataValue, Foundry, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<DataValue>> + Send + 'static,
    {
        Self {
            id: OperationId::new(),
            name: name.into(),
            execute: Arc::new(move |input, foundry, cancel| Box::pin(execute(input, foundry, cancel))),
            compensate: None,
        }
    }

    /// Creates an operation from a synchronous closure.
    pub fn from_fn<F>(name: impl Into<String>, action: F) -> Self
    where
        F: Fn(DataValue, &Foundry) -> Result<DataValue> + Send + Sync + 'static,
    {
        let action = Arc::new(action);
        Self::new(name, move |input, foundry, _cancel| {
            let action = Arc::clone(&action);
            async move { action(input, &foundry) }
        })
    }

    /// Attaches a compensating closure, enabling compensation.
    pub fn with_compensation<F, Fut>(mut self, compensate: F) -> Self
    where
        F: Fn(DataValue, Foundry, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        self.compensate = Some(Arc::new(move |output, foundry, cancel| {
            Box::pin(compensate(output, foundry, cancel))
        }));
        self
    }
}

#[async_trait]
impl Operation for DelegateOperation {
    fn id(&self) -> OperationId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_compensation(&self) -> bool {
        self.compensate.is_some()
    }

    async fn execute(
        &self,
        input: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<DataValue> {
        (self.execute)(input, foundry.clone(), cancel.clone()).await
    }

    async fn compensate(
        &self,
        output: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<()> {
        match &self.compensate {
            Some(compensate) => compensate(output, foundry.clone(), cancel.clone()).await,
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForgeError;

    #[tokio::test]
    async fn test_delegate_executes_closure() {
        let op = DelegateOperation::new("double", |input, _foundry, _cancel| async move {
            match input {
                DataValue::Int(n) => Ok(DataValue::Int(n * 2)),
                other => Err(ForgeError::failure("double", format!("got {}", other.type_name()))),
            }
        });

        let foundry = Foundry::new("test");
        let cancel = CancellationToken::new();

        assert_eq!(op.name(), "double");
        assert!(!op.supports_compensation());
        assert_eq!(
            op.execute(DataValue::Int(21), &foundry, &cancel).await.unwrap(),
            DataValue::Int(42)
        );
        assert!(op.execute(DataValue::Null, &foundry, &cancel).await.is_err());
    }

    #[tokio::test]
    async fn test_delegate_compensation() {
        let op = DelegateOperation::from_fn("reserve", |input, foundry| {
            foundry.set("reserved", true);
            Ok(input)
        })
        .with_compensation(|_output, foundry, _cancel| async move {
            foundry.remove("reserved");
            Ok(())
        });

        let foundry = Foundry::new("test");
        let cancel = CancellationToken::new();

        assert!(op.supports_compensation());
        let output = op.execute(DataValue::Null, &foundry, &cancel).await.unwrap();
        assert!(foundry.contains_key("reserved"));

        op.compensate(output, &foundry, &cancel).await.unwrap();
        assert!(!foundry.contains_key("reserved"));
    }
}
