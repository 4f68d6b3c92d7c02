// src/config/model.rs

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::dag::DependencyMap;
use crate::engine::ExecutorOptions;
use crate::exec::RetrySchedule;
use crate::resource::DEFAULT_POLL_INTERVAL;
use crate::resource::gpu::DEFAULT_GPU_THRESHOLD;
use crate::types::{FailurePolicy, RawResources, ResourcePolicy};

/// Matrix of template values: key -> candidate values, in the order the keys
/// are declared.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Matrix {
    entries: Vec<(String, Vec<MatrixValue>)>,
}

impl Matrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the values of `key`. A new key goes last; an existing key keeps
    /// its position.
    pub fn insert(&mut self, key: impl Into<String>, values: Vec<MatrixValue>) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => *existing = values,
            None => self.entries.push((key, values)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<MatrixValue>)> {
        self.entries.iter().map(|(key, values)| (key, values))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'de> Deserialize<'de> for Matrix {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct MatrixVisitor;

        impl<'de> Visitor<'de> for MatrixVisitor {
            type Value = Matrix;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a table of `key = [values]`")
            }

            fn visit_map<A>(self, mut map: A) -> std::result::Result<Matrix, A::Error>
            where
                A: MapAccess<'de>,
            {
                let mut matrix = Matrix::new();
                while let Some((key, values)) = map.next_entry::<String, Vec<MatrixValue>>()? {
                    matrix.insert(key, values);
                }
                Ok(matrix)
            }
        }

        deserializer.deserialize_map(MatrixVisitor)
    }
}

/// A single matrix value. TOML numbers and booleans are accepted and used
/// through their textual form.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum MatrixValue {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for MatrixValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatrixValue::Text(s) => f.write_str(s),
            MatrixValue::Integer(i) => write!(f, "{i}"),
            MatrixValue::Float(x) => write!(f, "{x}"),
            MatrixValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for MatrixValue {
    fn from(s: &str) -> Self {
        MatrixValue::Text(s.to_string())
    }
}

/// Workflow file as read from TOML, before matrix expansion and validation.
///
/// ```toml
/// name = "sweep"
/// resources = "gpus"
/// matrix = { lr = ["0.1", "0.01"] }
///
/// [tasks.prep]
/// command = "python prep.py"
///
/// [tasks.train]
/// command = "python train.py"
/// args = ["--lr", "{lr}"]
/// deps = ["prep"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkflowConfig {
    pub name: String,

    /// `"gpus"`, a list of resource labels, or absent.
    #[serde(default)]
    pub resources: Option<RawResources>,

    /// `"halt"` (default) or `"continue"`.
    #[serde(default)]
    pub on_failure: FailurePolicy,

    /// Retry delays in seconds.
    #[serde(default = "default_retry")]
    pub retry: Vec<u64>,

    /// Utilization / memory ratio under which a GPU counts as free.
    #[serde(default = "default_gpu_threshold")]
    pub gpu_threshold: f64,

    /// Delay between two scans of a busy resource pool.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Workflow-level matrix; every combination gets a full copy of the tasks.
    #[serde(default)]
    pub matrix: Option<Matrix>,

    /// All tasks from `[tasks.<name>]`.
    #[serde(default)]
    pub tasks: BTreeMap<String, TaskConfig>,
}

fn default_retry() -> Vec<u64> {
    RetrySchedule::default()
        .delays()
        .map(|d| d.as_secs())
        .collect()
}

fn default_gpu_threshold() -> f64 {
    DEFAULT_GPU_THRESHOLD
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

/// `[tasks.<name>]` section.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TaskConfig {
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    /// Tasks that must finish before this one starts.
    #[serde(default)]
    pub deps: Vec<String>,

    /// Task-level matrix; expands the task into `<name>_<j>` variants.
    #[serde(default)]
    pub matrix: Option<Matrix>,
}

impl TaskConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            deps: Vec::new(),
            matrix: None,
        }
    }

    /// Command followed by its space-separated arguments.
    pub fn command_line(&self) -> String {
        if self.args.is_empty() {
            self.command.clone()
        } else {
            format!("{} {}", self.command, self.args.join(" "))
        }
    }
}

/// Validated, fully expanded workflow.
///
/// Every task is concrete (no matrix left), every dependency names another
/// task and the dependency graph is acyclic.
#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub name: String,
    pub resources: ResourcePolicy,
    pub on_failure: FailurePolicy,
    pub retry: Vec<u64>,
    pub gpu_threshold: f64,
    pub poll_interval_ms: u64,
    pub tasks: BTreeMap<String, TaskConfig>,
}

impl WorkflowConfig {
    /// Node -> dependencies map for layering.
    pub fn to_nodes(&self) -> DependencyMap {
        self.tasks
            .iter()
            .map(|(name, task)| (name.clone(), task.deps.clone()))
            .collect()
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            failure_policy: self.on_failure,
            retry: RetrySchedule::from_secs(&self.retry),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            gpu_threshold: self.gpu_threshold,
        }
    }
}
