//! Single-threaded cooperative executor.
//!
//! The host owns the [`Scheduler`] and decides when work happens: either by
//! calling [`Scheduler::step`] from its own loop, or by handing one task to
//! [`Scheduler::block_on`]. Tasks never run on another thread.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::runtime::{Builder, Runtime};
use tokio::task::{JoinError, JoinHandle, LocalSet};
use tracing::debug;

use crate::{Task, TaskError, TaskResult};

/// A cooperative executor over a current-thread tokio runtime.
pub struct Scheduler {
    runtime: Runtime,
    local: LocalSet,
}

impl Scheduler {
    /// Create a scheduler with its own current-thread runtime.
    ///
    /// # Errors
    ///
    /// Returns `TaskError::Runtime` if the runtime cannot be built.
    pub fn new() -> TaskResult<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        debug!("Scheduler created");
        Ok(Self {
            runtime,
            local: LocalSet::new(),
        })
    }

    /// Start `task`. It makes progress whenever the scheduler is stepped or
    /// blocked on.
    pub fn spawn<T: 'static>(&self, task: Task<T>) -> TaskHandle<T> {
        TaskHandle {
            inner: self.local.spawn_local(task),
        }
    }

    /// Advance every runnable task once.
    pub fn step(&self) {
        self.local.block_on(&self.runtime, tokio::task::yield_now());
    }

    /// Drive `task` (and anything spawned) until `task` completes.
    ///
    /// # Errors
    ///
    /// Returns the task's own failure.
    pub fn block_on<T: 'static>(&self, task: Task<T>) -> TaskResult<T> {
        self.local.block_on(&self.runtime, task)
    }

    /// Drive an arbitrary future to completion on the scheduler.
    pub fn block_on_future<F: Future>(&self, future: F) -> F::Output {
        self.local.block_on(&self.runtime, future)
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

/// Handle to a task started with [`Scheduler::spawn`].
///
/// Awaiting the handle yields the task's result. Dropping it detaches the task.
pub struct TaskHandle<T> {
    inner: JoinHandle<TaskResult<T>>,
}

impl<T> TaskHandle<T> {
    /// Whether the task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    /// Request cancellation. The task is not polled again.
    pub fn cancel(&self) {
        self.inner.abort();
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = TaskResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.inner)
            .poll(cx)
            .map(|joined| joined.unwrap_or_else(|e| Err(join_error(e))))
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

fn join_error(err: JoinError) -> TaskError {
    if err.is_cancelled() {
        return TaskError::Cancelled;
    }
    match err.try_into_panic() {
        Ok(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_owned());
            TaskError::Panicked(message)
        },
        Err(err) => TaskError::failed(err),
    }
}
