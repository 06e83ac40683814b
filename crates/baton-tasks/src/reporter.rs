//! Task execution reporting

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cache::CacheSource;
use crate::task::TaskId;

/// Events emitted during a run
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// Dependencies are done and the task is being hashed
    Hashing { id: TaskId },
    /// Outputs were restored from the cache
    CacheHit {
        id: TaskId,
        hash: String,
        source: CacheSource,
        time_saved: Duration,
    },
    /// Nothing cached for this hash
    CacheMiss { id: TaskId, hash: String },
    /// The task's command is starting
    Started { id: TaskId, command: String },
    /// A line of task output
    Output {
        id: TaskId,
        line: String,
        is_stderr: bool,
    },
    /// A status line for the task's prefix (cache hit/miss notices)
    Message { id: TaskId, text: String },
    /// A task completed successfully
    Completed {
        id: TaskId,
        duration: Duration,
        cached: bool,
    },
    /// A task failed
    Failed {
        id: TaskId,
        duration: Duration,
        error: String,
        exit_code: Option<i32>,
    },
    /// A task never ran
    Skipped { id: TaskId, reason: String },
    /// All tasks finished
    RunCompleted {
        total: usize,
        succeeded: usize,
        failed: usize,
        cached: usize,
        duration: Duration,
    },
}

impl TaskEvent {
    /// Task the event belongs to, if any
    pub fn task_id(&self) -> Option<&TaskId> {
        match self {
            Self::Hashing { id }
            | Self::CacheHit { id, .. }
            | Self::CacheMiss { id, .. }
            | Self::Started { id, .. }
            | Self::Output { id, .. }
            | Self::Message { id, .. }
            | Self::Completed { id, .. }
            | Self::Failed { id, .. }
            | Self::Skipped { id, .. } => Some(id),
            Self::RunCompleted { .. } => None,
        }
    }
}

/// Trait for reporting task execution progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Logs events through `tracing`
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Hashing { id } => {
                tracing::debug!(task = %id, "hashing");
            }
            TaskEvent::CacheHit {
                id,
                hash,
                source,
                time_saved,
            } => {
                tracing::info!(task = %id, hash = %hash, source = %source, saved_ms = time_saved.as_millis() as u64, "cache hit");
            }
            TaskEvent::CacheMiss { id, hash } => {
                tracing::info!(task = %id, hash = %hash, "cache miss");
            }
            TaskEvent::Started { id, command } => {
                tracing::info!("Starting {}: {}", id, command);
            }
            TaskEvent::Output { id, line, is_stderr } => {
                if *is_stderr {
                    tracing::debug!(task = %id, stream = "stderr", "{}", line);
                } else {
                    tracing::trace!(task = %id, stream = "stdout", "{}", line);
                }
            }
            TaskEvent::Message { id, text } => {
                tracing::debug!(task = %id, "{}", text);
            }
            TaskEvent::Completed { id, duration, cached } => {
                if *cached {
                    tracing::info!("{} completed (cached) in {:.1}s", id, duration.as_secs_f64());
                } else {
                    tracing::info!("{} completed in {:.1}s", id, duration.as_secs_f64());
                }
            }
            TaskEvent::Failed {
                id,
                duration,
                error,
                exit_code,
            } => {
                tracing::error!(exit_code = ?exit_code, "{} failed after {:.1}s: {}", id, duration.as_secs_f64(), error);
            }
            TaskEvent::Skipped { id, reason } => {
                tracing::info!("{} skipped: {}", id, reason);
            }
            TaskEvent::RunCompleted {
                total,
                succeeded,
                failed,
                cached,
                duration,
            } => {
                tracing::info!(
                    "All tasks complete: {}/{} succeeded, {} failed, {} cached ({:.1}s)",
                    succeeded,
                    total,
                    failed,
                    cached,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Collects events for later inspection
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// All collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Output and message lines of one task, in order
    pub fn lines_for(&self, id: &TaskId) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TaskEvent::Output { id: ref e, line, .. } if e == id => Some(line),
                TaskEvent::Message { id: ref e, text } if e == id => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}

/// Fans events out to several reporters
#[derive(Default)]
pub struct TaskReporterRegistry {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl TaskReporterRegistry {
    /// Registry with a [`TracingReporter`]
    pub fn new() -> Self {
        Self {
            reporters: vec![Arc::new(TracingReporter)],
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn register(&mut self, reporter: Arc<dyn TaskReporter>) {
        self.reporters.push(reporter);
    }

    pub fn all(&self) -> &[Arc<dyn TaskReporter>] {
        &self.reporters
    }
}

impl TaskReporter for TaskReporterRegistry {
    fn report(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}
