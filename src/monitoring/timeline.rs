//! Execution Timeline
//!
//! Tracks workflow and operation lifecycle events for run reports and
//! Gantt-style summaries. The Smith publishes events to any registered
//! [`ForgeObserver`]; [`TimelineRecorder`] is the stock observer that keeps
//! them in an [`ExecutionTimeline`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

const LABEL_WIDTH: usize = 16;
const CHART_WIDTH: usize = 50;

/// Type of timeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    /// Workflow run started
    WorkflowStarted,
    /// Workflow run finished without error
    WorkflowCompleted,
    /// Workflow run finished with an error
    WorkflowFailed,
    /// Operation started executing
    Started,
    /// Operation completed successfully
    Completed,
    /// Operation failed
    Failed,
    /// Operation skipped because a checkpoint marks it done
    Skipped,
    /// Operation compensated after a later failure
    Compensated,
    /// Operation compensation itself failed
    CompensationFailed,
}

/// A single event in the execution timeline.
#[derive(Debug, Clone)]
pub struct TimelineEvent {
    /// Name of the operation (or workflow, for workflow events)
    pub name: String,
    /// Type of event
    pub event_type: EventType,
    /// When the event occurred
    pub timestamp: Instant,
    /// Wall-clock time of the event
    pub recorded_at: DateTime<Utc>,
}

/// Receives lifecycle events from the Smith.
pub trait ForgeObserver: Send + Sync {
    fn on_event(&self, name: &str, event_type: EventType);
}

/// Tracks the execution timeline of a workflow.
#[derive(Debug, Clone)]
pub struct ExecutionTimeline {
    events: Vec<TimelineEvent>,
    start_time: Instant,
}

impl ExecutionTimeline {
    /// Creates a new timeline starting now.
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            start_time: Instant::now(),
        }
    }

    /// Records an event.
    pub fn add_event(&mut self, name: impl Into<String>, event_type: EventType) {
        self.events.push(TimelineEvent {
            name: name.into(),
            event_type,
            timestamp: Instant::now(),
            recorded_at: Utc::now(),
        });
    }

    /// Returns all recorded events.
    pub fn get_events(&self) -> &[TimelineEvent] {
        &self.events
    }

    /// Names with an event of the given type, in recording order.
    pub fn names_with(&self, event_type: EventType) -> Vec<String> {
        self.events
            .iter()
            .filter(|e| e.event_type == event_type)
            .map(|e| e.name.clone())
            .collect()
    }

    /// Returns the total elapsed time since timeline creation.
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Pairs each `Started` event with the next completion or failure of the
    /// same operation. Spans are ordered by start time.
    pub fn spans(&self) -> Vec<OperationSpan> {
        let mut open: HashMap<&str, Duration> = HashMap::new();
        let mut spans = Vec::new();

        for event in &self.events {
            let offset = event.timestamp.duration_since(self.start_time);
            match event.event_type {
                EventType::Started => {
                    open.insert(event.name.as_str(), offset);
                }
                EventType::Completed | EventType::Failed => {
                    if let Some(start) = open.remove(event.name.as_str()) {
                        spans.push(OperationSpan {
                            name: event.name.clone(),
                            start,
                            end: offset,
                            failed: event.event_type == EventType::Failed,
                        });
                    }
                }
                _ => {}
            }
        }

        spans.sort_by_key(|span| span.start);
        spans
    }

    /// Run time of every finished operation. A repeated operation keeps its
    /// last span.
    pub fn get_durations(&self) -> HashMap<String, Duration> {
        self.spans()
            .into_iter()
            .map(|span| {
                let duration = span.duration();
                (span.name, duration)
            })
            .collect()
    }

    /// Renders an ASCII Gantt chart of operation spans.
    ///
    /// Completed spans are drawn with `#`, failed ones with `x`.
    pub fn gantt_chart(&self) -> String {
        let mut output = String::from("\nExecution Timeline:\n\n");

        let total = self.elapsed();
        if total.is_zero() {
            return output;
        }
        let scale = CHART_WIDTH as f64 / total.as_secs_f64();

        for span in self.spans() {
            let offset = (span.start.as_secs_f64() * scale) as usize;
            let width = ((span.duration().as_secs_f64() * scale) as usize).max(1);
            let mark = if span.failed { "x" } else { "#" };

            output.push_str(&format!(
                "{} |{}{}| {:.1?}\n",
                truncate(&span.name, LABEL_WIDTH),
                " ".repeat(offset.min(CHART_WIDTH)),
                mark.repeat(width),
                span.duration()
            ));
        }

        let compensated = self.names_with(EventType::Compensated).len();
        let skipped = self.names_with(EventType::Skipped).len();
        if compensated + skipped > 0 {
            output.push_str(&format!(
                "\n{} skipped, {} compensated\n",
                skipped, compensated
            ));
        }

        output.push_str(&format!("\nTotal: {:.1?}\n", total));
        output
    }
}

/// Start and end of one operation run, relative to the timeline start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationSpan {
    pub name: String,
    pub start: Duration,
    pub end: Duration,
    pub failed: bool,
}

impl OperationSpan {
    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }
}

impl Default for ExecutionTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer that records every event into an [`ExecutionTimeline`].
#[derive(Debug, Default)]
pub struct TimelineRecorder {
    timeline: Mutex<ExecutionTimeline>,
}

impl TimelineRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the timeline recorded so far.
    pub fn timeline(&self) -> ExecutionTimeline {
        match self.timeline.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Shorthand for `timeline().names_with(event_type)`.
    pub fn names_with(&self, event_type: EventType) -> Vec<String> {
        self.timeline().names_with(event_type)
    }
}

impl ForgeObserver for TimelineRecorder {
    fn on_event(&self, name: &str, event_type: EventType) {
        let mut guard = match self.timeline.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.add_event(name, event_type);
    }
}

/// Truncates a string to a maximum length.
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        format!("{:width$}", s, width = max_len)
    } else {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    }
}
