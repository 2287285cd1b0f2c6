//! For-Each Fan-Out
//!
//! [`ForEachOperation`] splits its input into elements and drives every
//! element through a sub-pipeline, with at most `max_concurrency` element
//! pipelines in flight at once. Outputs are returned in input order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use log::{debug, error, info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ForgeError, Result};
use crate::execution::step::{
    compensate_completed, release_completed, run_pipeline, CompletedStep, PipelineFailure,
};
use crate::foundry::{DataValue, Foundry};

use super::{Operation, OperationId};

type Splitter = dyn Fn(&DataValue) -> Option<Vec<DataValue>> + Send + Sync;

/// Completed pipeline steps of one element, kept for compensation.
struct ElementTrace {
    index: usize,
    completed: Vec<CompletedStep>,
}

/// Outcome of one spawned element pipeline.
type ElementResult = (
    usize,
    std::result::Result<(DataValue, Vec<CompletedStep>), PipelineFailure>,
);

/// Applies a pipeline of operations to every element of a collection.
///
/// Failure handling follows the run's `continue_on_error` setting:
/// - fail-fast: the first element failure signals cancellation to running
///   elements, stops new ones from starting and is returned as
///   [`ForgeError::ElementFailed`]; every step that other elements
///   completed, including those of elements cut short, is compensated
/// - aggregated: every element runs and failures come back together in a
///   [`ForgeError::AggregateFailure`] whose output holds the successful
///   results (failed slots are null)
pub struct ForEachOperation {
    id: OperationId,
    name: String,
    pipeline: Arc<[Arc<dyn Operation>]>,
    max_concurrency: Option<usize>,
    splitter: Box<Splitter>,
    traces: DashMap<Uuid, Vec<ElementTrace>>,
}

impl ForEachOperation {
    /// Creates a for-each over `pipeline`. Lists are split into their items.
    pub fn new(name: impl Into<String>, pipeline: Vec<Arc<dyn Operation>>) -> Self {
        Self {
            id: OperationId::new(),
            name: name.into(),
            pipeline: pipeline.into(),
            max_concurrency: None,
            splitter: Box::new(|input: &DataValue| input.as_list().map(<[DataValue]>::to_vec)),
            traces: DashMap::new(),
        }
    }

    /// Bounds concurrent element pipelines (clamped to at least one).
    ///
    /// Without a bound the foundry's `max_concurrency` setting applies.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = Some(max.max(1));
        self
    }

    /// Replaces the split strategy. Returning `None` rejects the input.
    pub fn with_splitter<F>(mut self, splitter: F) -> Self
    where
        F: Fn(&DataValue) -> Option<Vec<DataValue>> + Send + Sync + 'static,
    {
        self.splitter = Box::new(splitter);
        self
    }

    fn concurrency_for(&self, foundry: &Foundry) -> usize {
        self.max_concurrency
            .unwrap_or(foundry.settings().max_concurrency)
            .max(1)
    }

    async fn rollback(&self, traces: &[ElementTrace], cancel: &CancellationToken) {
        for trace in traces {
            let errors = compensate_completed(&trace.completed, cancel, &[]).await;
            for e in errors {
                warn!("Rollback of element {} in '{}' failed: {}", trace.index, self.name, e);
            }
        }
    }

    fn release_traces(traces: &[ElementTrace]) {
        for trace in traces {
            release_completed(&trace.completed);
        }
    }
}

#[async_trait]
impl Operation for ForEachOperation {
    fn id(&self) -> OperationId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn supports_compensation(&self) -> bool {
        self.pipeline.iter().any(|op| op.supports_compensation())
    }

    async fn execute(
        &self,
        input: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<DataValue> {
        let elements = (self.splitter)(&input).ok_or_else(|| ForgeError::InvalidInput {
            step: self.name.clone(),
            reason: format!("cannot split {} into elements", input.type_name()),
        })?;

        let count = elements.len();
        let limit = self.concurrency_for(foundry);
        let fail_fast = !foundry.settings().continue_on_error;
        info!(
            "Fanning out '{}' over {} element(s) (max concurrency: {}, fail fast: {})",
            self.name, count, limit, fail_fast
        );

        let semaphore = Arc::new(Semaphore::new(limit));
        let elements_cancel = cancel.child_token();
        let failed = Arc::new(AtomicBool::new(false));
        let mut tasks: JoinSet<ElementResult> = JoinSet::new();

        for (index, element) in elements.into_iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = elements_cancel.cancelled() => break,
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            if failed.load(Ordering::SeqCst) {
                debug!("'{}' stopped dispatching at element {}", self.name, index);
                break;
            }

            let pipeline = Arc::clone(&self.pipeline);
            let foundry = foundry.clone();
            let token = elements_cancel.clone();
            let failed = Arc::clone(&failed);

            tasks.spawn(async move {
                let result = run_pipeline(&pipeline, element, &foundry, &token).await;
                if fail_fast && result.as_ref().is_err_and(|f| !f.error.is_canceled()) {
                    failed.store(true, Ordering::SeqCst);
                    token.cancel();
                }
                drop(permit);
                (index, result)
            });
        }

        let mut outputs: Vec<Option<DataValue>> = vec![None; count];
        let mut traces = Vec::new();
        let mut leftovers = Vec::new();
        let mut errors: Vec<(usize, ForgeError)> = Vec::new();
        let mut first_failure: Option<(usize, ForgeError)> = None;

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok((output, completed)))) => {
                    outputs[index] = Some(output);
                    traces.push(ElementTrace { index, completed });
                }
                Ok((index, Err(PipelineFailure { error, completed }))) => {
                    if !completed.is_empty() {
                        leftovers.push(ElementTrace { index, completed });
                    }
                    if first_failure.is_none() && !error.is_canceled() {
                        first_failure = Some((index, error.clone()));
                    }
                    errors.push((index, error));
                }
                Err(join_error) => {
                    error!("Element task in '{}' aborted: {}", self.name, join_error);
                    elements_cancel.cancel();
                    let e = ForgeError::failure(&self.name, format!("element task aborted: {}", join_error));
                    if first_failure.is_none() {
                        first_failure = Some((count, e.clone()));
                    }
                    errors.push((count, e));
                }
            }
        }

        if errors.is_empty() && cancel.is_cancelled() {
            // Dispatch stopped early without any element reporting the cancel.
            if outputs.iter().any(Option::is_none) {
                Self::release_traces(&traces);
                return Err(ForgeError::canceled(&self.name));
            }
        }

        if errors.is_empty() {
            traces.sort_by_key(|trace| trace.index);
            self.traces.insert(foundry.scope(), traces);
            info!("'{}' completed {} element(s)", self.name, count);
            return Ok(DataValue::List(outputs.into_iter().flatten().collect()));
        }

        if cancel.is_cancelled() {
            // A caller cancellation leaves committed work in place.
            warn!("'{}' canceled with {} element(s) unfinished", self.name, errors.len());
            Self::release_traces(&traces);
            Self::release_traces(&leftovers);
            return Err(ForgeError::canceled(&self.name));
        }

        if fail_fast {
            if let Some((index, source)) = first_failure {
                error!("Element {} of '{}' failed: {}", index, self.name, source);
                traces.append(&mut leftovers);
                traces.sort_by_key(|trace| trace.index);
                self.rollback(&traces, cancel).await;
                Self::release_traces(&traces);
                return Err(ForgeError::ElementFailed {
                    step: self.name.clone(),
                    index,
                    source: Box::new(source),
                });
            }
        }

        Self::release_traces(&traces);
        Self::release_traces(&leftovers);
        errors.sort_by_key(|(index, _)| *index);
        warn!(
            "'{}' finished with {} failed element(s) out of {}",
            self.name,
            errors.len(),
            count
        );
        Err(ForgeError::AggregateFailure {
            step: self.name.clone(),
            errors: errors
                .into_iter()
                .map(|(index, source)| ForgeError::ElementFailed {
                    step: self.name.clone(),
                    index,
                    source: Box::new(source),
                })
                .collect(),
            output: Some(DataValue::List(
                outputs
                    .into_iter()
                    .map(Option::unwrap_or_default)
                    .collect(),
            )),
        })
    }

    async fn compensate(
        &self,
        _output: DataValue,
        foundry: &Foundry,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let Some((_, traces)) = self.traces.remove(&foundry.scope()) else {
            debug!("'{}' has nothing to compensate", self.name);
            return Ok(());
        };

        let mut errors = Vec::new();
        for trace in &traces {
            for source in compensate_completed(&trace.completed, cancel, &[]).await {
                errors.push(ForgeError::ElementFailed {
                    step: self.name.clone(),
                    index: trace.index,
                    source: Box::new(source),
                });
            }
        }
        Self::release_traces(&traces);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ForgeError::AggregateFailure {
                step: self.name.clone(),
                errors,
                output: None,
            })
        }
    }

    fn release(&self, foundry: &Foundry) {
        if let Some((_, traces)) = self.traces.remove(&foundry.scope()) {
            Self::release_traces(&traces);
        }
    }
}
