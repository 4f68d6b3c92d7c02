// src/errors.rs

//! Crate-wide error types.
//!
//! Each layer has its own enum so that callers can match on the failure
//! kind: [`GraphError`] for layering, [`ProbeError`] for hardware discovery,
//! [`TaskError`] for a single submission. [`NanoflowError`] is what the
//! binary and config loader return.

use thiserror::Error;

/// Dependency graph is not a valid DAG.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node '{node}' depends on unknown node '{dependency}'")]
    UnknownDependency { node: String, dependency: String },

    #[error("cycle detected in task graph involving node '{node}'")]
    Cycle { node: String },
}

/// Resource discovery query failed.
#[derive(Error, Debug)]
pub enum ProbeError {
    #[error("failed to run resource probe: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("resource probe exited with code {code}: {stderr}")]
    QueryFailed { code: i32, stderr: String },

    #[error("cannot parse resource probe output line '{line}': {reason}")]
    Parse { line: String, reason: String },
}

/// Failure of one attempt (or, once retries are exhausted, one submission).
#[derive(Error, Debug)]
pub enum TaskError {
    #[error("task `{task}` failed with exit code {code}")]
    NonZeroExit { task: String, code: i32 },

    #[error("task `{task}` could not be started: {source}")]
    Spawn {
        task: String,
        #[source]
        source: std::io::Error,
    },

    #[error("task `{task}` aborted: {reason}")]
    Aborted { task: String, reason: String },

    #[error(transparent)]
    Probe(#[from] ProbeError),

    #[error("task `{task}` failed: {reason}")]
    Failed { task: String, reason: String },
}

#[derive(Error, Debug)]
pub enum NanoflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("{} task(s) failed: {}", failed.len(), failed.join(", "))]
    RunFailed { failed: Vec<String> },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, NanoflowError>;
