//! Task error types.

use thiserror::Error;

/// Errors produced by tasks and the scheduler.
#[derive(Debug, Error)]
pub enum TaskError {
    /// The task was cancelled before it completed.
    #[error("Task was cancelled")]
    Cancelled,

    /// The task panicked while being polled.
    #[error("Task panicked: {0}")]
    Panicked(String),

    /// An error annotated with where it happened.
    #[error("{context}: {source}")]
    Context {
        /// Description of the failing operation.
        context: String,
        /// The wrapped error.
        #[source]
        source: Box<TaskError>,
    },

    /// The executor could not be created.
    #[error("Scheduler error: {0}")]
    Runtime(#[from] std::io::Error),

    /// The task's own computation failed.
    #[error(transparent)]
    Failed(Box<dyn std::error::Error + Send + Sync>),
}

impl TaskError {
    /// Wrap any error as a task failure.
    pub fn failed(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Failed(err.into())
    }

    /// Annotate this error with context.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error beneath any context layers.
    #[must_use]
    pub fn root(&self) -> &TaskError {
        let mut current = self;
        while let Self::Context { source, .. } = current {
            current = source;
        }
        current
    }

    /// Whether this error is (or wraps) a cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self.root(), Self::Cancelled)
    }
}

/// Result type for task operations.
pub type TaskResult<T> = Result<T, TaskError>;
