#![allow(dead_code)]

use std::collections::BTreeMap;

use nanoflow::config::{Matrix, MatrixValue, RawWorkflowConfig, TaskConfig, WorkflowConfig};
use nanoflow::errors::Result;
use nanoflow::types::{FailurePolicy, RawResources};

/// Builder for `WorkflowConfig` to simplify test setup.
pub struct WorkflowConfigBuilder {
    config: RawWorkflowConfig,
}

impl WorkflowConfigBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            config: RawWorkflowConfig {
                name: name.to_string(),
                resources: None,
                on_failure: FailurePolicy::Halt,
                retry: Vec::new(),
                gpu_threshold: 0.05,
                poll_interval_ms: 10,
                matrix: None,
                tasks: BTreeMap::new(),
            },
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.tasks.insert(name.to_string(), task);
        self
    }

    pub fn with_gpus(mut self) -> Self {
        self.config.resources = Some(RawResources::Named("gpus".to_string()));
        self
    }

    pub fn with_resources(mut self, labels: &[&str]) -> Self {
        self.config.resources = Some(RawResources::List(
            labels.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    pub fn with_retry(mut self, secs: &[u64]) -> Self {
        self.config.retry = secs.to_vec();
        self
    }

    pub fn on_failure(mut self, policy: FailurePolicy) -> Self {
        self.config.on_failure = policy;
        self
    }

    pub fn with_matrix(mut self, key: &str, values: &[&str]) -> Self {
        let matrix = self.config.matrix.get_or_insert_with(Matrix::new);
        matrix.insert(
            key.to_string(),
            values.iter().map(|v| MatrixValue::from(*v)).collect(),
        );
        self
    }

    pub fn raw(self) -> RawWorkflowConfig {
        self.config
    }

    pub fn try_build(self) -> Result<WorkflowConfig> {
        WorkflowConfig::try_from(self.config)
    }

    pub fn build(self) -> WorkflowConfig {
        self.try_build()
            .expect("Failed to build valid workflow from builder")
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(command: &str) -> Self {
        Self {
            task: TaskConfig::new(command),
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.task.args.push(arg.to_string());
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.deps.push(dep.to_string());
        self
    }

    pub fn matrix(mut self, key: &str, values: &[&str]) -> Self {
        let matrix = self.task.matrix.get_or_insert_with(Matrix::new);
        matrix.insert(
            key.to_string(),
            values.iter().map(|v| MatrixValue::from(*v)).collect(),
        );
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
