// src/types.rs

use std::str::FromStr;

use serde::Deserialize;

/// What the executor does once a task has failed terminally.
///
/// - `Halt`: let the current layer drain, then skip all remaining layers
///   (default behaviour).
/// - `Continue`: keep going through every layer; failures are only reported
///   at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    Halt,
    Continue,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        FailurePolicy::Halt
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "halt" => Ok(FailurePolicy::Halt),
            "continue" => Ok(FailurePolicy::Continue),
            other => Err(format!(
                "invalid on_failure: {other} (expected \"halt\" or \"continue\")"
            )),
        }
    }
}

/// Resource policy for a workflow, from the `resources` field.
///
/// ```toml
/// resources = "gpus"          # Accelerators
/// resources = ["a", "b"]      # Custom
/// # absent                    # None
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ResourcePolicy {
    /// No resource constraint.
    #[default]
    None,
    /// Accelerator devices discovered (and re-discovered) through the GPU probe.
    Accelerators,
    /// A fixed, user supplied list of resource labels.
    Custom(Vec<String>),
}

/// Raw TOML shape of `resources`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawResources {
    Named(String),
    List(Vec<String>),
}

impl TryFrom<Option<RawResources>> for ResourcePolicy {
    type Error = String;

    fn try_from(raw: Option<RawResources>) -> Result<Self, Self::Error> {
        match raw {
            None => Ok(ResourcePolicy::None),
            Some(RawResources::Named(name)) => name.parse(),
            Some(RawResources::List(labels)) => Ok(ResourcePolicy::Custom(labels)),
        }
    }
}

impl FromStr for ResourcePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gpus" => Ok(ResourcePolicy::Accelerators),
            other => Err(format!(
                "invalid resources: {other} (expected \"gpus\" or a list of resource labels)"
            )),
        }
    }
}
