//! Cooperative task scheduling for Stagehand.
//!
//! Everything runs on one thread: a [`Task`] is a lazily evaluated future,
//! a [`Scheduler`] advances spawned tasks when the host steps it, and a
//! [`TaskGroup`] starts a batch of tasks together and joins them in start
//! order with cooperative cancellation on the first failure.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Task error types.
pub mod error;
/// Start-together task groups.
pub mod group;
/// The host-driven executor.
pub mod scheduler;
/// The `Task` future and its combinators.
pub mod task;

pub use error::{TaskError, TaskResult};
pub use group::TaskGroup;
pub use scheduler::{Scheduler, TaskHandle};
pub use task::Task;
