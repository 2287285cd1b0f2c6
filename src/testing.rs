//! Shared operations for unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::{ForgeError, Result};
use crate::foundry::{DataValue, Foundry};
use crate::operation::{DelegateOperation, Operation, OperationId};

/// Routes log records to the test harness output.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Appends its name to `executed` and passes its input through.
pub fn recording_step(name: &'static str) -> Arc<dyn Operation> {
    Arc::new(DelegateOperation::from_fn(name, move |input, foundry| {
        foundry.push("executed", name)?;
        Ok(input)
    }))
}

/// Like [`recording_step`], and appends its name to `compensated` when undone.
pub fn undoable_step(name: &'static str) -> Arc<dyn Operation> {
    Arc::new(
        DelegateOperation::from_fn(name, move |input, foundry| {
            foundry.push("executed", name)?;
            Ok(input)
        })
        .with_compensation(move |_output, foundry, _cancel| async move {
            foundry.push("compensated", name)?;
            Ok(())
        }),
    )
}

/// Always fails with an operation failure.
pub fn failing_step(name: &'static str) -> Arc<dyn Operation> {
    Arc::new(DelegateOperation::from_fn(name, move |_, _| {
        Err(ForgeError::failure(name, "boom"))
    }))
}

/// Sets `released:<name>` when the run releases it.
pub fn releasing_step(name: &'static str) -> Arc<dyn Operation> {
    Arc::new(Releasing {
        id: OperationId::new(),
        name,
    })
}

struct Releasing {
    id: OperationId,
    name: &'static str,
}

#[async_trait]
impl Operation for Releasing {
    fn id(&self) -> OperationId {
        self.id
    }

    fn name(&self) -> &str {
        self.name
    }

    async fn execute(
        &self,
        input: DataValue,
        _foundry: &Foundry,
        _cancel: &CancellationToken,
    ) -> Result<DataValue> {
        Ok(input)
    }

    fn release(&self, foundry: &Foundry) {
        foundry.set(format!("released:{}", self.name), true);
    }
}
