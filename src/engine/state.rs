// src/engine/state.rs

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Point-in-time copy of the run counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
}

impl ProgressSnapshot {
    /// Tasks that have not settled yet (running or not started).
    pub fn remaining(&self) -> usize {
        self.total - self.completed - self.failed
    }

    /// `"completed/total"`.
    pub fn progress(&self) -> String {
        format!("{}/{}", self.completed, self.total)
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

impl fmt::Display for ProgressSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} done, {} running, {} failed, {} remaining",
            self.progress(),
            self.running,
            self.failed,
            self.remaining()
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    running: usize,
    completed: usize,
    failed: usize,
}

/// Live counters of an executor run.
///
/// Updated by the executor as tasks are submitted and settle; readable from
/// any thread through [`snapshot`](Self::snapshot). Updates are serialized
/// by a mutex so a snapshot is always internally consistent.
#[derive(Debug)]
pub struct ExecutorState {
    total: usize,
    counters: Mutex<Counters>,
}

impl ExecutorState {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            counters: Mutex::new(Counters::default()),
        }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let c = self.lock();
        ProgressSnapshot {
            total: self.total,
            running: c.running,
            completed: c.completed,
            failed: c.failed,
        }
    }

    pub fn progress(&self) -> String {
        self.snapshot().progress()
    }

    pub(crate) fn mark_submitted(&self) {
        self.lock().running += 1;
    }

    pub(crate) fn mark_succeeded(&self) {
        let mut c = self.lock();
        c.running = c.running.saturating_sub(1);
        c.completed += 1;
    }

    pub(crate) fn mark_failed(&self) {
        let mut c = self.lock();
        c.running = c.running.saturating_sub(1);
        c.failed += 1;
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
