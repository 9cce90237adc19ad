//! Start-together, join-in-order task groups.
//!
//! Every task in a [`TaskGroup`] starts on the first poll of the joined task
//! and runs interleaved with its siblings. The first failure cancels the
//! group's token; siblings that have not finished stop at their next
//! suspension point and are never polled again. The joined task only resolves
//! after every member has stopped, so a failure is reported with no sibling
//! still in flight.

use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Task, TaskError};

/// A set of tasks joined in start order.
pub struct TaskGroup<T> {
    token: CancellationToken,
    tasks: Vec<Task<T>>,
}

impl<T: 'static> TaskGroup<T> {
    /// Create an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Vec::new(),
        }
    }

    /// The group's cancellation token, for tasks that want to observe
    /// cancellation themselves.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Add a task. Tasks start in the order they are added.
    pub fn push(&mut self, task: Task<T>) {
        let token = self.token.clone();
        self.tasks.push(Task::new(async move {
            let result = tokio::select! {
                biased;
                () = token.cancelled() => Err(TaskError::Cancelled),
                result = task => result,
            };
            if result.is_err() {
                token.cancel();
            }
            result
        }));
    }

    /// Number of tasks in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Run every task and collect the results in start order.
    ///
    /// Fails with the first non-cancellation error in start order, or with
    /// `TaskError::Cancelled` if the only failures were cancellations.
    pub fn join(self) -> Task<Vec<T>> {
        let Self { tasks, .. } = self;
        Task::new(async move {
            let count = tasks.len();
            let results = join_all(tasks).await;

            let mut values = Vec::with_capacity(count);
            let mut first_error: Option<TaskError> = None;
            let mut cancelled = 0usize;
            for result in results {
                match result {
                    Ok(value) => values.push(value),
                    Err(err) if err.is_cancelled() => {
                        cancelled = cancelled.saturating_add(1);
                        first_error.get_or_insert(err);
                    },
                    Err(err) => {
                        if first_error.as_ref().is_none_or(TaskError::is_cancelled) {
                            first_error = Some(err);
                        }
                    },
                }
            }

            match first_error {
                Some(err) => {
                    debug!(tasks = count, cancelled, "Task group failed");
                    Err(err)
                },
                None => Ok(values),
            }
        })
    }
}

impl<T: 'static> Default for TaskGroup<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for TaskGroup<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGroup")
            .field("tasks", &self.tasks.len())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
