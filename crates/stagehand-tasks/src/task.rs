//! The `Task` type and its combinators.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::LocalBoxFuture;

use crate::{TaskError, TaskResult};

/// A suspendable computation producing a `TaskResult<T>`.
///
/// Tasks are lazy: nothing runs until the task is awaited, spawned on a
/// [`Scheduler`](crate::Scheduler) or added to a [`TaskGroup`](crate::TaskGroup).
/// They are not `Send`; everything runs on the scheduler's single thread.
#[must_use = "tasks do nothing unless awaited or spawned"]
pub struct Task<T> {
    inner: LocalBoxFuture<'static, TaskResult<T>>,
}

impl<T: 'static> Task<T> {
    /// Wrap a future.
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = TaskResult<T>> + 'static,
    {
        Self {
            inner: future.boxed_local(),
        }
    }

    /// A task that completes immediately with `value`.
    pub fn ready(value: T) -> Self {
        Self::from_result(Ok(value))
    }

    /// A task that fails immediately with `err`.
    pub fn failed(err: TaskError) -> Self {
        Self::from_result(Err(err))
    }

    /// A task that completes immediately with `result`.
    pub fn from_result(result: TaskResult<T>) -> Self {
        Self::new(futures::future::ready(result))
    }

    /// Run `f` on the result once the task completes, keeping the result.
    pub fn tap<F>(self, f: F) -> Self
    where
        F: FnOnce(&TaskResult<T>) + 'static,
    {
        Self::new(async move {
            let result = self.await;
            f(&result);
            result
        })
    }

    /// Transform a successful result.
    pub fn map<U, F>(self, f: F) -> Task<U>
    where
        U: 'static,
        F: FnOnce(T) -> U + 'static,
    {
        Task::new(async move { self.await.map(f) })
    }

    /// Chain a follow-up task onto a successful result and surface its result.
    pub fn then<U, F>(self, f: F) -> Task<U>
    where
        U: 'static,
        F: FnOnce(T) -> Task<U> + 'static,
    {
        Task::new(async move {
            let value = self.await?;
            f(value).await
        })
    }

    /// Transform a failure.
    pub fn map_err<F>(self, f: F) -> Self
    where
        F: FnOnce(TaskError) -> TaskError + 'static,
    {
        Self::new(async move { self.await.map_err(f) })
    }

    /// Annotate a failure with context.
    pub fn context(self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.map_err(move |err| err.context(context))
    }
}

impl<T> Future for Task<T> {
    type Output = TaskResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}

impl<T> std::fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn run<T: 'static>(task: Task<T>) -> TaskResult<T> {
        futures::executor::block_on(task)
    }

    #[test]
    fn map_and_then_compose() {
        let task = Task::ready(2)
            .map(|v| v * 10)
            .then(|v| Task::new(async move { Ok(v + 1) }));
        assert_eq!(run(task).unwrap(), 21);
    }

    #[test]
    fn tap_sees_result_and_keeps_it() {
        let seen = Rc::new(RefCell::new(None));
        let s = Rc::clone(&seen);
        let task = Task::ready("value").tap(move |r| {
            *s.borrow_mut() = r.as_ref().ok().copied();
        });
        assert_eq!(run(task).unwrap(), "value");
        assert_eq!(*seen.borrow(), Some("value"));
    }

    #[test]
    fn then_short_circuits_on_failure() {
        let called = Rc::new(RefCell::new(false));
        let c = Rc::clone(&called);
        let task = Task::<u32>::failed(TaskError::failed("nope")).then(move |v| {
            *c.borrow_mut() = true;
            Task::ready(v)
        });
        assert!(run(task).is_err());
        assert!(!*called.borrow());
    }

    #[test]
    fn context_wraps_failures_only() {
        let err = run(Task::<()>::failed(TaskError::Cancelled).context("asset a.json")).unwrap_err();
        assert_eq!(err.to_string(), "asset a.json: Task was cancelled");
        assert_eq!(run(Task::ready(1).context("unused")).unwrap(), 1);
    }
}
