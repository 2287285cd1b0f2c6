//! Run Monitoring Module
//!
//! Lifecycle events and execution timeline for workflow runs.
//!
//! # Components
//!
//! - [`ForgeObserver`]: Receives events from the Smith
//! - [`ExecutionTimeline`]: Operation start/end timing for Gantt charts

pub mod timeline;

pub use timeline::{
    EventType, ExecutionTimeline, ForgeObserver, OperationSpan, TimelineEvent, TimelineRecorder,
};
