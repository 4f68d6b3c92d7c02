// src/exec/retry.rs

use std::collections::VecDeque;
use std::time::Duration;

/// Delays between attempts, consumed front to back.
///
/// One entry is used per failed attempt; once empty, the next failure is
/// terminal. Each submission works on its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrySchedule {
    delays: VecDeque<Duration>,
}

impl RetrySchedule {
    pub fn new(delays: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            delays: delays.into_iter().collect(),
        }
    }

    pub fn from_secs(secs: &[u64]) -> Self {
        Self::new(secs.iter().copied().map(Duration::from_secs))
    }

    /// No retries: the first failure is terminal.
    pub fn none() -> Self {
        Self::new([])
    }

    /// Pop the next delay, or `None` once exhausted.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.delays.pop_front()
    }

    pub fn remaining(&self) -> usize {
        self.delays.len()
    }

    pub fn delays(&self) -> impl Iterator<Item = Duration> + '_ {
        self.delays.iter().copied()
    }
}

impl Default for RetrySchedule {
    /// 10s, 30s, 60s.
    fn default() -> Self {
        Self::from_secs(&[10, 30, 60])
    }
}
