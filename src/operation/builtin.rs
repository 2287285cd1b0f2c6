//! Built-in Operations
//!
//! Small reusable steps: a cancel-aware delay, a logging checkpoint and a
//! conditional branch.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use log::Level;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::Result;
use crate::foundry::{DataValue, Foundry};

use super::{cancellable_sleep, Operation, OperationId};

/// Waits for a fixed duration, then passes its input through.
pub struct DelayOperation {
    id: OperationId,
    name: String,
    duration: Duration,
}

impl DelayOperation {
    pub fn new(name: impl Into<String>, duration: Duration) -> Self {
        Self {
            id: OperationId::new(),
            name: name.into(),
            duration,
        }
    }
}

#[async_trait]
impl Operation for DelayOperation {
    fn id(&self) -> OperationId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        input: DataValue,
        _foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<DataValue> {
        cancellable_sleep(self.duration, cancel, &self.name).await?;
        Ok(input)
    }
}

/// Writes a message to the foundry logger and passes its input through.
pub struct LoggingOperation {
    id: OperationId,
    name: String,
    message: String,
    level: Level,
}

impl LoggingOperation {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: OperationId::new(),
            name: name.into(),
            message: message.into(),
            level: Level::Info,
        }
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

#[async_trait]
impl Operation for LoggingOperation {
    fn id(&self) -> OperationId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(
        &self,
        input: DataValue,
        foundry: &Foundry,
        _cancel: &CancellationToken,
    ) -> Result<DataValue> {
        foundry.logger().log(self.level, &self.message);
        Ok(input)
    }
}

type Predicate = dyn Fn(&DataValue, &Foundry) -> bool + Send + Sync;

/// Runs one of two operations depending on a predicate.
///
/// The branch taken is remembered per invocation scope so that compensation
/// undoes the operation that actually ran, even when several invocations
/// share one foundry.
pub struct ConditionalOperation {
    id: OperationId,
    name: String,
    predicate: Box<Predicate>,
    then_op: Arc<dyn Operation>,
    else_op: Option<Arc<dyn Operation>>,
    taken: DashMap<Uuid, bool>,
}

impl ConditionalOperation {
    pub fn new<P>(name: impl Into<String>, predicate: P, then_op: Arc<dyn Operation>) -> Self
    where
        P: Fn(&DataValue, &Foundry) -> bool + Send + Sync + 'static,
    {
        Self {
            id: OperationId::new(),
            name: name.into(),
            predicate: Box::new(predicate),
            then_op,
            else_op: None,
            taken: DashMap::new(),
        }
    }

    /// Sets the operation run when the predicate is false.
    pub fn otherwise(mut self, else_op: Arc<dyn Operation>) -> Self {
        self.else_op = Some(else_op);
        self
    }
}

#[async_trait]
impl Operation for ConditionalOperation {
    fn id(&self) -> OperationId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_compensation(&self) -> bool {
        self.then_op.supports_compensation()
            || self
                .else_op
                .as_ref()
                .is_some_and(|op| op.supports_compensation())
    }

    async fn execute(
        &self,
        input: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<DataValue> {
        let condition = (self.predicate)(&input, foundry);
        self.taken.insert(foundry.scope(), condition);

        match (condition, &self.else_op) {
            (true, _) => self.then_op.execute(input, foundry, cancel).await,
            (false, Some(else_op)) => else_op.execute(input, foundry, cancel).await,
            (false, None) => Ok(input),
        }
    }

    async fn compensate(
        &self,
        output: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let branch = match self.taken.get(&foundry.scope()).map(|entry| *entry.value()) {
            Some(true) => Some(&self.then_op),
            Some(false) => self.else_op.as_ref(),
            None => None,
        };

        match branch {
            Some(op) if op.supports_compensation() => op.compensate(output, foundry, cancel).await,
            _ => Ok(()),
        }
    }

    fn release(&self, foundry: &Foundry) {
        self.taken.remove(&foundry.scope());
        self.then_op.release(foundry);
        if let Some(else_op) = &self.else_op {
            else_op.release(foundry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForgeError;
    use crate::operation::DelegateOperation;

    #[tokio::test]
    async fn test_delay_passes_input_through() {
        let op = DelayOperation::new("wait", Duration::from_millis(5));
        let foundry = Foundry::new("test");
        let cancel = CancellationToken::new();

        let output = op.execute(DataValue::from("x"), &foundry, &cancel).await.unwrap();
        assert_eq!(output, DataValue::from("x"));
    }

    #[tokio::test]
    async fn test_delay_canceled() {
        let op = DelayOperation::new("wait", Duration::from_secs(60));
        let foundry = Foundry::new("test");
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let err = op.execute(DataValue::Null, &foundry, &cancel).await.unwrap_err();
        assert!(matches!(err, ForgeError::Canceled { .. }));
    }

    #[tokio::test]
    async fn test_logging_operation() {
        let op = LoggingOperation::new("note", "checkpoint reached").with_level(Level::Debug);
        let foundry = Foundry::new("test");
        let cancel = CancellationToken::new();

        let output = op.execute(DataValue::Int(1), &foundry, &cancel).await.unwrap();
        assert_eq!(output, DataValue::Int(1));
    }

    #[tokio::test]
    async fn test_conditional_branches_and_compensates_taken_branch() {
        let then_op = Arc::new(
            DelegateOperation::from_fn("premium", |input, foundry| {
                foundry.set("tier", "premium");
                Ok(input)
            })
            .with_compensation(|_out, foundry, _cancel| async move {
                foundry.set("premium_undone", true);
                Ok(())
            }),
        );
        let else_op = Arc::new(DelegateOperation::from_fn("basic", |input, foundry| {
            foundry.set("tier", "basic");
            Ok(input)
        }));

        let op = ConditionalOperation::new(
            "choose_tier",
            |input, _foundry| matches!(input, DataValue::Int(n) if *n > 100),
            then_op,
        )
        .otherwise(else_op);

        let cancel = CancellationToken::new();

        let small = Foundry::new("small");
        op.execute(DataValue::Int(5), &small, &cancel).await.unwrap();
        assert_eq!(small.get_as::<String>("tier").unwrap().as_deref(), Some("basic"));
        op.compensate(DataValue::Int(5), &small, &cancel).await.unwrap();
        assert!(!small.contains_key("premium_undone"));

        let large = Foundry::new("large");
        op.execute(DataValue::Int(500), &large, &cancel).await.unwrap();
        assert_eq!(large.get_as::<String>("tier").unwrap().as_deref(), Some("premium"));
        assert!(op.supports_compensation());
        op.compensate(DataValue::Int(500), &large, &cancel).await.unwrap();
        assert_eq!(large.get_as::<bool>("premium_undone").unwrap(), Some(true));

        op.release(&large);
        assert!(op.taken.get(&large.scope()).is_none());
    }

    #[tokio::test]
    async fn test_conditional_keeps_branches_apart_within_one_foundry() {
        let big = Arc::new(
            DelegateOperation::from_fn("big", |input, _| Ok(input)).with_compensation(
                |out, foundry, _cancel| async move {
                    foundry.push("big_undone", out)?;
                    Ok(())
                },
            ),
        );
        let small = Arc::new(
            DelegateOperation::from_fn("small", |input, _| Ok(input)).with_compensation(
                |out, foundry, _cancel| async move {
                    foundry.push("small_undone", out)?;
                    Ok(())
                },
            ),
        );
        let op = ConditionalOperation::new(
            "size",
            |input, _| matches!(input, DataValue::Int(n) if *n > 100),
            big,
        )
        .otherwise(small);

        let foundry = Foundry::new("shared");
        let cancel = CancellationToken::new();
        let first = foundry.scoped();
        let second = foundry.scoped();

        op.execute(DataValue::Int(500), &first, &cancel).await.unwrap();
        op.execute(DataValue::Int(5), &second, &cancel).await.unwrap();
        op.compensate(DataValue::Int(500), &first, &cancel).await.unwrap();

        assert_eq!(foundry.get("big_undone").unwrap(), DataValue::list(vec![500]));
        assert!(!foundry.contains_key("small_undone"));

        op.release(&first);
        op.release(&second);
        assert!(op.taken.is_empty());
    }
}
