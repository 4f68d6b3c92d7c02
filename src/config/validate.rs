// src/config/validate.rs

use std::collections::BTreeSet;

use crate::config::matrix::expand_tasks;
use crate::config::model::{RawWorkflowConfig, WorkflowConfig};
use crate::dag::layer_nodes;
use crate::errors::{NanoflowError, Result};
use crate::types::ResourcePolicy;

impl TryFrom<RawWorkflowConfig> for WorkflowConfig {
    type Error = NanoflowError;

    fn try_from(raw: RawWorkflowConfig) -> std::result::Result<Self, Self::Error> {
        ensure_has_name(&raw)?;
        ensure_has_tasks(&raw)?;
        validate_global_config(&raw)?;
        let resources = validate_resources(&raw)?;

        let tasks = expand_tasks(&raw)?;

        let cfg = WorkflowConfig {
            name: raw.name,
            resources,
            on_failure: raw.on_failure,
            retry: raw.retry,
            gpu_threshold: raw.gpu_threshold,
            poll_interval_ms: raw.poll_interval_ms,
            tasks,
        };

        validate_commands(&cfg)?;
        // Unknown dependencies and cycles surface as GraphError.
        layer_nodes(&cfg.to_nodes())?;

        Ok(cfg)
    }
}

fn ensure_has_name(cfg: &RawWorkflowConfig) -> Result<()> {
    if cfg.name.trim().is_empty() {
        return Err(NanoflowError::ConfigError(
            "workflow `name` must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn ensure_has_tasks(cfg: &RawWorkflowConfig) -> Result<()> {
    if cfg.tasks.is_empty() {
        return Err(NanoflowError::ConfigError(
            "workflow must contain at least one [tasks.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(cfg: &RawWorkflowConfig) -> Result<()> {
    if !(0.0..=1.0).contains(&cfg.gpu_threshold) {
        return Err(NanoflowError::ConfigError(format!(
            "gpu_threshold must be within [0, 1] (got {})",
            cfg.gpu_threshold
        )));
    }

    if cfg.poll_interval_ms == 0 {
        return Err(NanoflowError::ConfigError(
            "poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(())
}

fn validate_resources(cfg: &RawWorkflowConfig) -> Result<ResourcePolicy> {
    let policy = ResourcePolicy::try_from(cfg.resources.clone()).map_err(NanoflowError::ConfigError)?;

    if let ResourcePolicy::Custom(labels) = &policy {
        if labels.is_empty() {
            return Err(NanoflowError::ConfigError(
                "`resources` list must not be empty".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for label in labels.iter() {
            if !seen.insert(label) {
                return Err(NanoflowError::ConfigError(format!(
                    "resource '{label}' is listed more than once"
                )));
            }
        }
    }

    Ok(policy)
}

fn validate_commands(cfg: &WorkflowConfig) -> Result<()> {
    for (name, task) in cfg.tasks.iter() {
        if task.command.trim().is_empty() {
            return Err(NanoflowError::ConfigError(format!(
                "task '{name}' has an empty command"
            )));
        }
    }
    Ok(())
}
