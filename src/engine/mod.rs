// src/engine/mod.rs

//! Orchestration engine.
//!
//! - [`state`] holds the live run counters that a display can poll.
//! - [`executor`] builds one [`Task`](crate::exec::Task) per workflow node,
//!   picks the resource pool from the workflow's resource policy and drives
//!   layer-by-layer concurrent execution.

pub mod executor;
pub mod state;

pub use crate::types::{FailurePolicy, ResourcePolicy};
pub use executor::{Executor, ExecutorOptions, RunReport, TaskFailure};
pub use state::{ExecutorState, ProgressSnapshot};
