// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`retry`] holds the per-submission backoff schedule.
//! - [`task`] defines [`Task`], the retryable unit of work, and the
//!   [`TaskHandle`] returned by [`Task::submit`].
//! - [`command`] runs shell command lines with `tokio::process` and streams
//!   their output to an [`UpdateHook`].

pub mod command;
pub mod retry;
pub mod task;

pub use command::{ShellCommand, UpdateHook};
pub use retry::RetrySchedule;
pub use task::{
    ResourceBinder, SubmissionState, Task, TaskHandle, Work, WorkFuture, binder_fn, work_fn,
};
