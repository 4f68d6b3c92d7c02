// src/exec/task.rs

//! Retryable unit of work.
//!
//! A submission goes through
//! `Pending -> Acquiring -> Running -> {Succeeded | Retrying -> Acquiring | Failed}`
//! (`Acquiring` is skipped when no pool is configured). The resource taken in
//! `Acquiring` is held by a [`ResourceLease`] and released when the attempt
//! ends, whatever its outcome.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::errors::TaskError;
use crate::exec::retry::RetrySchedule;
use crate::resource::{ResourceId, ResourceLease, ResourcePool};

pub type WorkFuture<T> = Pin<Box<dyn Future<Output = Result<T, TaskError>> + Send>>;

/// The work procedure of a task. Called once per attempt.
pub type Work<T> = Arc<dyn Fn() -> WorkFuture<T> + Send + Sync>;

/// Derives the procedure to run from the task's procedure and the resource
/// acquired for this attempt.
pub type ResourceBinder<T> = Arc<dyn Fn(Work<T>, &ResourceId) -> Work<T> + Send + Sync>;

/// Wrap an async closure as a [`Work`].
pub fn work_fn<T, F, Fut>(f: F) -> Work<T>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, TaskError>> + Send + 'static,
{
    Arc::new(move || -> WorkFuture<T> { Box::pin(f()) })
}

/// Wrap a closure as a [`ResourceBinder`].
pub fn binder_fn<T, F>(f: F) -> ResourceBinder<T>
where
    F: Fn(Work<T>, &ResourceId) -> Work<T> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Lifecycle of a single submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Pending,
    Acquiring,
    Running,
    Retrying,
    Succeeded,
    Failed,
}

impl SubmissionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, SubmissionState::Succeeded | SubmissionState::Failed)
    }
}

/// A named, retryable unit of work, optionally bound to a resource pool.
pub struct Task<T> {
    name: String,
    work: Work<T>,
    retry: RetrySchedule,
    pool: Option<Arc<dyn ResourcePool>>,
    binder: Option<ResourceBinder<T>>,
}

impl<T> Clone for Task<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            work: Arc::clone(&self.work),
            retry: self.retry.clone(),
            pool: self.pool.clone(),
            binder: self.binder.clone(),
        }
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("retry", &self.retry)
            .field("has_pool", &self.pool.is_some())
            .field("has_binder", &self.binder.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Task<T> {
    /// New task with the default retry schedule, no pool and no binder.
    pub fn new(name: impl Into<String>, work: Work<T>) -> Self {
        Self {
            name: name.into(),
            work,
            retry: RetrySchedule::default(),
            pool: None,
            binder: None,
        }
    }

    pub fn with_retry(mut self, retry: RetrySchedule) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_pool(mut self, pool: Arc<dyn ResourcePool>) -> Self {
        self.pool = Some(pool);
        self
    }

    /// The binder is only applied when a pool is configured.
    pub fn with_binder(mut self, binder: ResourceBinder<T>) -> Self {
        self.binder = Some(binder);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn retry_schedule(&self) -> &RetrySchedule {
        &self.retry
    }

    pub fn has_pool(&self) -> bool {
        self.pool.is_some()
    }

    pub fn has_binder(&self) -> bool {
        self.binder.is_some()
    }

    /// Run the plain work procedure once, inline.
    ///
    /// No resource is acquired, no binder applied and nothing is retried.
    pub async fn run_once(&self) -> Result<T, TaskError> {
        if self.pool.is_some() || self.binder.is_some() {
            warn!(
                task = %self.name,
                "task has a resource pool or resource binder, which run_once ignores"
            );
        }
        (*self.work)().await
    }

    /// Start a new submission on the Tokio runtime.
    ///
    /// Every submission gets a fresh copy of the retry schedule.
    pub fn submit(&self) -> TaskHandle<T> {
        let (state_tx, state_rx) = watch::channel(SubmissionState::Pending);
        let submission = Submission {
            name: self.name.clone(),
            work: Arc::clone(&self.work),
            schedule: self.retry.clone(),
            pool: self.pool.clone(),
            binder: self.binder.clone(),
            state: state_tx,
        };

        TaskHandle {
            name: self.name.clone(),
            join: tokio::spawn(submission.run()),
            state: state_rx,
        }
    }
}

/// Handle to a running submission.
#[derive(Debug)]
pub struct TaskHandle<T> {
    name: String,
    join: JoinHandle<Result<T, TaskError>>,
    state: watch::Receiver<SubmissionState>,
}

impl<T> TaskHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Latest state of the submission.
    pub fn state(&self) -> SubmissionState {
        *self.state.borrow()
    }

    /// Receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<SubmissionState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the submission to settle.
    pub async fn wait(self) -> Result<T, TaskError> {
        match self.join.await {
            Ok(result) => result,
            Err(err) => Err(aborted(&self.name, err)),
        }
    }
}

/// Per-submission state: owns the mutable copy of the retry schedule.
struct Submission<T> {
    name: String,
    work: Work<T>,
    schedule: RetrySchedule,
    pool: Option<Arc<dyn ResourcePool>>,
    binder: Option<ResourceBinder<T>>,
    state: watch::Sender<SubmissionState>,
}

impl<T: Send + 'static> Submission<T> {
    async fn run(mut self) -> Result<T, TaskError> {
        loop {
            match self.attempt().await {
                Ok(value) => {
                    self.set_state(SubmissionState::Succeeded);
                    info!(task = %self.name, "task succeeded");
                    return Ok(value);
                }
                Err(err) => {
                    error!(task = %self.name, error = %err, "failed to execute task");
                    match self.schedule.next_delay() {
                        Some(delay) => {
                            self.set_state(SubmissionState::Retrying);
                            info!(
                                task = %self.name,
                                delay_secs = delay.as_secs_f64(),
                                retries_left = self.schedule.remaining(),
                                "retrying task after delay"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            self.set_state(SubmissionState::Failed);
                            error!(task = %self.name, error = %err, "task failed; no retries left");
                            return Err(err);
                        }
                    }
                }
            }
        }
    }

    async fn attempt(&self) -> Result<T, TaskError> {
        let Some(pool) = &self.pool else {
            self.set_state(SubmissionState::Running);
            return execute(&self.name, Arc::clone(&self.work)).await;
        };

        self.set_state(SubmissionState::Acquiring);
        let id = pool.acquire().await?;
        let lease = ResourceLease::new(Arc::clone(pool), id);
        info!(task = %self.name, resource = %lease.id(), "acquired resource for task");

        let work = match &self.binder {
            Some(bind) => bind(Arc::clone(&self.work), lease.id()),
            None => Arc::clone(&self.work),
        };

        self.set_state(SubmissionState::Running);
        let result = execute(&self.name, work).await;
        drop(lease);
        result
    }

    fn set_state(&self, next: SubmissionState) {
        let prev = self.state.send_replace(next);
        debug!(task = %self.name, from = ?prev, to = ?next, "submission state changed");
    }
}

/// Run the procedure as its own Tokio task so a panic inside it becomes an
/// ordinary failed attempt.
async fn execute<T: Send + 'static>(task: &str, work: Work<T>) -> Result<T, TaskError> {
    match tokio::spawn((*work)()).await {
        Ok(result) => result,
        Err(err) => Err(aborted(task, err)),
    }
}

fn aborted(task: &str, err: JoinError) -> TaskError {
    let reason = if err.is_panic() {
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        format!("panicked: {message}")
    } else {
        "cancelled".to_string()
    };

    TaskError::Aborted {
        task: task.to_string(),
        reason,
    }
}
