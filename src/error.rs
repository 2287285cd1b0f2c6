//! Error Types
//!
//! Every fallible operation in the runtime returns [`Result<T>`], whose error
//! side is a [`ForgeError`]. Timeouts and caller cancellations have their own
//! variants and are never folded into business failures.

use std::time::Duration;

use thiserror::Error;

use crate::foundry::DataValue;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ForgeError>;

/// Errors raised while forging workflows.
#[derive(Debug, Clone, Error)]
pub enum ForgeError {
    /// Business error reported by an operation.
    #[error("operation '{step}' failed: {message}")]
    OperationFailure { step: String, message: String },

    /// The timeout middleware fired before the operation finished.
    #[error("operation '{step}' timed out after {duration:?}")]
    Timeout { step: String, duration: Duration },

    /// The caller requested cancellation.
    #[error("operation '{step}' was canceled")]
    Canceled { step: String },

    /// Ordered collection of failures gathered under continue-on-error.
    ///
    /// `output` carries a combined partial result when the source produced
    /// one (a for-each with failed elements does).
    #[error("{} failure(s) in '{step}': [{}]", .errors.len(), join_messages(.errors))]
    AggregateFailure {
        step: String,
        errors: Vec<ForgeError>,
        output: Option<DataValue>,
    },

    /// A for-each received an input it could not split.
    #[error("invalid input for '{step}': {reason}")]
    InvalidInput { step: String, reason: String },

    /// A typed property read found a value of another type.
    #[error("property '{key}' holds {actual}, expected {expected}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Checkpoint read or write failed.
    #[error("persistence failure{}: {message}", .step.as_ref().map(|s| format!(" after '{}'", s)).unwrap_or_default())]
    PersistenceFailure {
        step: Option<String>,
        message: String,
    },

    /// The recovery runner consumed its retry budget.
    #[error("recovery exhausted for '{step}' after {attempts} attempt(s): {last}")]
    RecoveryExhausted {
        step: String,
        attempts: u32,
        last: Box<ForgeError>,
    },

    /// Fail-fast wrapper naming the step that stopped the workflow.
    #[error("workflow failed at step '{step}': {source}")]
    StepFailed {
        step: String,
        #[source]
        source: Box<ForgeError>,
        compensation_errors: Vec<ForgeError>,
    },

    /// One element of a for-each failed.
    #[error("element {index} of '{step}' failed: {source}")]
    ElementFailed {
        step: String,
        index: usize,
        #[source]
        source: Box<ForgeError>,
    },

    /// The workflow definition was rejected.
    #[error("invalid workflow: {0}")]
    InvalidWorkflow(String),
}

fn join_messages(errors: &[ForgeError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl ForgeError {
    /// Builds an [`ForgeError::OperationFailure`].
    pub fn failure(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OperationFailure {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Builds a [`ForgeError::Canceled`].
    pub fn canceled(step: impl Into<String>) -> Self {
        Self::Canceled { step: step.into() }
    }

    /// Builds a [`ForgeError::PersistenceFailure`].
    pub fn persistence(step: Option<&str>, message: impl Into<String>) -> Self {
        Self::PersistenceFailure {
            step: step.map(str::to_string),
            message: message.into(),
        }
    }

    /// Follows wrapping variants down to the error that started it all.
    pub fn root_cause(&self) -> &ForgeError {
        match self {
            Self::StepFailed { source, .. } | Self::ElementFailed { source, .. } => {
                source.root_cause()
            }
            Self::RecoveryExhausted { last, .. } => last.root_cause(),
            other => other,
        }
    }

    /// True when the root cause is a middleware timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self.root_cause(), Self::Timeout { .. })
    }

    /// True when the root cause is a caller cancellation.
    pub fn is_canceled(&self) -> bool {
        matches!(self.root_cause(), Self::Canceled { .. })
    }

    /// Name of the step the error is attributed to, if any.
    pub fn step_name(&self) -> Option<&str> {
        match self {
            Self::OperationFailure { step, .. }
            | Self::Timeout { step, .. }
            | Self::Canceled { step }
            | Self::AggregateFailure { step, .. }
            | Self::InvalidInput { step, .. }
            | Self::RecoveryExhausted { step, .. }
            | Self::StepFailed { step, .. }
            | Self::ElementFailed { step, .. } => Some(step),
            Self::PersistenceFailure { step, .. } => step.as_deref(),
            Self::TypeMismatch { .. } | Self::InvalidWorkflow(_) => None,
        }
    }
}

impl From<serde_json::Error> for ForgeError {
    fn from(err: serde_json::Error) -> Self {
        Self::persistence(None, format!("serialization error: {}", err))
    }
}

impl From<std::io::Error> for ForgeError {
    fn from(err: std::io::Error) -> Self {
        Self::persistence(None, format!("I/O error: {}", err))
    }
}
