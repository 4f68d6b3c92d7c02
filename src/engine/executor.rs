// src/engine/executor.rs

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::WorkflowConfig;
use crate::dag::layer_nodes;
use crate::errors::{GraphError, NanoflowError, TaskError};
use crate::exec::{ResourceBinder, RetrySchedule, ShellCommand, Task, UpdateHook, Work, binder_fn};
use crate::resource::gpu::DEFAULT_GPU_THRESHOLD;
use crate::resource::{
    DEFAULT_POLL_INTERVAL, DynamicPool, NvidiaSmiProbe, ResourceId, ResourcePool, StaticPool,
    UnlimitedPool,
};
use crate::types::{FailurePolicy, ResourcePolicy};

/// Environment variable carrying the resource label for custom resource lists.
pub const RESOURCE_ENV: &str = "NANOFLOW_RESOURCE";

/// Knobs the executor takes from the workflow description.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorOptions {
    pub failure_policy: FailurePolicy,
    pub retry: RetrySchedule,
    pub poll_interval: Duration,
    pub gpu_threshold: f64,
}

impl Default for ExecutorOptions {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            retry: RetrySchedule::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            gpu_threshold: DEFAULT_GPU_THRESHOLD,
        }
    }
}

/// A task that ended in `Failed` after exhausting its retries.
#[derive(Debug)]
pub struct TaskFailure {
    pub task: String,
    pub error: TaskError,
}

/// Outcome of [`Executor::run`].
#[derive(Debug)]
pub struct RunReport {
    pub snapshot: super::ProgressSnapshot,
    pub failures: Vec<TaskFailure>,
    /// Layers that were started (and drained).
    pub layers_run: usize,
    pub layers_total: usize,
}

impl RunReport {
    /// No recorded failure and no failed count in the final snapshot.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && self.snapshot.failed == 0
    }

    pub fn failed_tasks(&self) -> Vec<String> {
        self.failures.iter().map(|f| f.task.clone()).collect()
    }

    /// `Err(RunFailed)` if any task failed.
    pub fn into_result(self) -> Result<(), NanoflowError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(NanoflowError::RunFailed {
                failed: self.failed_tasks(),
            })
        }
    }
}

/// Runs layers of tasks in strict sequence, the tasks of one layer
/// concurrently.
///
/// A layer is a barrier: every submission of layer `i` settles before any
/// task of layer `i + 1` is submitted. A failed task never cancels its
/// siblings. What happens to later layers is decided by the
/// [`FailurePolicy`].
pub struct Executor {
    name: String,
    layers: Vec<Vec<Task<()>>>,
    state: Arc<super::ExecutorState>,
    policy: FailurePolicy,
}

impl fmt::Debug for Executor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executor")
            .field("name", &self.name)
            .field("layers", &self.layer_names())
            .field("policy", &self.policy)
            .field("state", &self.state.snapshot())
            .finish()
    }
}

impl Executor {
    pub fn new(name: impl Into<String>, layers: Vec<Vec<Task<()>>>, policy: FailurePolicy) -> Self {
        let total = layers.iter().map(Vec::len).sum();
        Self {
            name: name.into(),
            layers,
            state: Arc::new(super::ExecutorState::new(total)),
            policy,
        }
    }

    /// Build the executor for a validated workflow.
    ///
    /// The pool follows the workflow's resource policy:
    /// - none: [`UnlimitedPool`], command unmodified;
    /// - accelerators: [`DynamicPool`] over [`NvidiaSmiProbe`], the command
    ///   sees `CUDA_VISIBLE_DEVICES=<id>`;
    /// - custom list: [`StaticPool`] over the labels, the command sees
    ///   `NANOFLOW_RESOURCE=<label>`.
    pub fn from_config(cfg: &WorkflowConfig, hook: Option<UpdateHook>) -> Result<Self, GraphError> {
        let options = cfg.executor_options();
        let pool = build_pool(&cfg.resources, &options);
        Self::from_config_with_pool(cfg, pool, hook)
    }

    /// Like [`from_config`](Self::from_config) but with a caller supplied pool.
    ///
    /// The resource policy still decides how an acquired resource is bound
    /// to the command.
    pub fn from_config_with_pool(
        cfg: &WorkflowConfig,
        pool: Arc<dyn ResourcePool>,
        hook: Option<UpdateHook>,
    ) -> Result<Self, GraphError> {
        let options = cfg.executor_options();
        let layered_nodes = layer_nodes(&cfg.to_nodes())?;

        let layers = layered_nodes
            .iter()
            .map(|nodes| {
                nodes
                    .iter()
                    .filter_map(|node| cfg.tasks.get(node).map(|tc| (node, tc)))
                    .map(|(node, tc)| {
                        let command =
                            ShellCommand::new(node.clone(), tc.command_line()).with_hook(hook.clone());
                        let task = Task::new(node.clone(), command.clone().into_work())
                            .with_retry(options.retry.clone())
                            .with_pool(Arc::clone(&pool));
                        match resource_binder(&cfg.resources, command) {
                            Some(binder) => task.with_binder(binder),
                            None => task,
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(Self::new(cfg.name.clone(), layers, options.failure_policy))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Live counters, shareable with a display.
    pub fn state(&self) -> Arc<super::ExecutorState> {
        Arc::clone(&self.state)
    }

    pub fn layer_names(&self) -> Vec<Vec<&str>> {
        self.layers
            .iter()
            .map(|layer| layer.iter().map(Task::name).collect())
            .collect()
    }

    /// Execute all layers.
    pub async fn run(&self) -> RunReport {
        let layers_total = self.layers.len();
        let mut failures: Vec<TaskFailure> = Vec::new();
        let mut layers_run = 0;

        info!(
            workflow = %self.name,
            tasks = self.state.total(),
            layers = layers_total,
            "starting workflow"
        );

        for (index, layer) in self.layers.iter().enumerate() {
            if !failures.is_empty() && self.policy == FailurePolicy::Halt {
                warn!(
                    workflow = %self.name,
                    skipped_layers = layers_total - index,
                    "halting after failed layer; remaining layers are not started"
                );
                break;
            }

            self.run_layer(index, layer, &mut failures).await;
            layers_run += 1;
        }

        let snapshot = self.state.snapshot();
        info!(workflow = %self.name, progress = %snapshot, "workflow finished");

        RunReport {
            snapshot,
            failures,
            layers_run,
            layers_total,
        }
    }

    async fn run_layer(&self, index: usize, layer: &[Task<()>], failures: &mut Vec<TaskFailure>) {
        let started = Instant::now();
        info!(layer = index, tasks = layer.len(), "starting execution of layer");

        let mut in_flight = JoinSet::new();
        let mut pending: BTreeSet<String> = BTreeSet::new();
        let mut lost: Option<String> = None;
        for task in layer {
            pending.insert(task.name().to_string());
            let handle = task.submit();
            self.state.mark_submitted();
            in_flight.spawn(async move {
                let name = handle.name().to_string();
                (name, handle.wait().await)
            });
        }

        while let Some(joined) = in_flight.join_next().await {
            match joined {
                Ok((task, Ok(()))) => {
                    pending.remove(&task);
                    self.state.mark_succeeded();
                    debug!(task = %task, progress = %self.state.progress(), "task settled");
                }
                Ok((task, Err(error))) => {
                    pending.remove(&task);
                    self.state.mark_failed();
                    error!(task = %task, error = %error, "task failed after exhausting retries");
                    failures.push(TaskFailure { task, error });
                }
                Err(join_err) => {
                    // Only reachable if the runtime shuts down under us.
                    self.state.mark_failed();
                    error!(error = %join_err, "lost track of a task submission");
                    lost = Some(join_err.to_string());
                }
            }
        }

        // Waiters that never reported back are failures too.
        if let Some(reason) = lost {
            for task in pending {
                failures.push(TaskFailure {
                    error: TaskError::Aborted {
                        task: task.clone(),
                        reason: format!("submission lost: {reason}"),
                    },
                    task,
                });
            }
        }

        info!(
            layer = index,
            elapsed_secs = started.elapsed().as_secs_f64(),
            progress = %self.state.progress(),
            "layer execution completed"
        );
    }
}

fn build_pool(policy: &ResourcePolicy, options: &ExecutorOptions) -> Arc<dyn ResourcePool> {
    match policy {
        ResourcePolicy::None => Arc::new(UnlimitedPool::default()),
        ResourcePolicy::Accelerators => {
            info!(threshold = options.gpu_threshold, "creating GPU resource pool");
            Arc::new(DynamicPool::with_poll_interval(
                NvidiaSmiProbe::new(options.gpu_threshold),
                options.poll_interval,
            ))
        }
        ResourcePolicy::Custom(labels) => {
            warn!(
                resources = ?labels,
                "custom resource lists are less exercised than GPU pools and may not work as expected"
            );
            Arc::new(StaticPool::with_poll_interval(
                labels.iter().cloned(),
                options.poll_interval,
            ))
        }
    }
}

/// Environment a command gets for the resource it runs on.
fn resource_envs(policy: &ResourcePolicy, id: &ResourceId) -> Vec<(&'static str, String)> {
    match policy {
        ResourcePolicy::None => Vec::new(),
        ResourcePolicy::Accelerators => vec![
            ("CUDA_VISIBLE_DEVICES", id.to_string()),
            ("FORCE_COLOR", "1".to_string()),
        ],
        ResourcePolicy::Custom(_) => vec![(RESOURCE_ENV, id.to_string())],
    }
}

fn resource_binder(policy: &ResourcePolicy, command: ShellCommand) -> Option<ResourceBinder<()>> {
    if *policy == ResourcePolicy::None {
        return None;
    }

    let policy = policy.clone();
    Some(binder_fn(move |_work: Work<()>, id: &ResourceId| {
        resource_envs(&policy, id)
            .into_iter()
            .fold(command.clone(), |cmd, (key, value)| cmd.with_env(key, value))
            .into_work()
    }))
}
