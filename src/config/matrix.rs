// src/config/matrix.rs

//! Template substitution and matrix expansion.
//!
//! `{key}` in a task name, command, argument or dependency is replaced by the
//! matrix value bound to `key`; placeholders without a binding are kept
//! verbatim so that later expansion passes (or the shell) can see them.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::debug;

use crate::config::model::{Matrix, RawWorkflowConfig, TaskConfig};
use crate::errors::{NanoflowError, Result};

/// One matrix combination: key -> value.
pub type Bindings = BTreeMap<String, String>;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
});

/// Replace every bound `{key}` in `template`.
pub fn substitute(template: &str, values: &Bindings) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| match values.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Cartesian product of the matrix.
///
/// Keys are iterated in declaration order and the last key varies fastest, so
/// `{b = [1, 2], a = [x, y]}` yields `b1 ax, b1 ay, b2 ax, b2 ay`.
/// A matrix without keys yields one empty combination.
pub fn combinations(matrix: &Matrix) -> Vec<Bindings> {
    let mut combos = vec![Bindings::new()];
    for (key, values) in matrix.iter() {
        combos = combos
            .into_iter()
            .flat_map(|combo| {
                values.iter().map(move |value| {
                    let mut next = combo.clone();
                    next.insert(key.clone(), value.to_string());
                    next
                })
            })
            .collect();
    }
    combos
}

impl TaskConfig {
    /// Copy with command, args and deps formatted with `values`.
    pub fn format(&self, values: &Bindings) -> TaskConfig {
        TaskConfig {
            command: substitute(&self.command, values),
            args: self.args.iter().map(|a| substitute(a, values)).collect(),
            deps: self.deps.iter().map(|d| substitute(d, values)).collect(),
            matrix: self.matrix.clone(),
        }
    }
}

/// Expand workflow and task matrices into concrete tasks.
///
/// - Workflow combination `i` prefixes task names and their dependencies
///   with `"{i}_"`.
/// - A task-level matrix turns task `name` into `name_0`, `name_1`, ...;
///   depending on `name` means depending on all of them.
pub fn expand_tasks(raw: &RawWorkflowConfig) -> Result<BTreeMap<String, TaskConfig>> {
    if let Some(matrix) = &raw.matrix {
        ensure_matrix_values("workflow", matrix)?;
    }
    for (name, task) in raw.tasks.iter() {
        if let Some(matrix) = &task.matrix {
            ensure_matrix_values(&format!("task '{name}'"), matrix)?;
        }
    }

    let workflow_combos: Vec<(String, Bindings)> = match &raw.matrix {
        None => vec![(String::new(), Bindings::new())],
        Some(matrix) => combinations(matrix)
            .into_iter()
            .enumerate()
            .map(|(i, values)| (format!("{i}_"), values))
            .collect(),
    };

    let mut tasks = BTreeMap::new();

    for (prefix, values) in workflow_combos.iter() {
        // Base name (formatted, unprefixed) -> concrete task names.
        let mut variants: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut expanded: Vec<(String, TaskConfig)> = Vec::new();

        for (base, task) in raw.tasks.iter() {
            let base_name = substitute(base, values);
            match &task.matrix {
                None => {
                    let name = format!("{prefix}{base_name}");
                    variants.entry(base_name).or_default().push(name.clone());
                    expanded.push((name, task.format(values)));
                }
                Some(matrix) => {
                    for (j, task_values) in combinations(matrix).iter().enumerate() {
                        let name = format!("{prefix}{base_name}_{j}");
                        variants
                            .entry(base_name.clone())
                            .or_default()
                            .push(name.clone());
                        expanded.push((name, task.format(task_values).format(values)));
                    }
                }
            }
        }

        for (name, mut task) in expanded {
            task.matrix = None;
            task.deps = task
                .deps
                .iter()
                .flat_map(|dep| match variants.get(dep) {
                    Some(names) => names.clone(),
                    None => vec![format!("{prefix}{dep}")],
                })
                .collect();

            if tasks.contains_key(&name) {
                return Err(NanoflowError::ConfigError(format!(
                    "matrix expansion produced duplicate task name '{name}'"
                )));
            }
            tasks.insert(name, task);
        }
    }

    debug!(
        declared = raw.tasks.len(),
        expanded = tasks.len(),
        "expanded workflow tasks"
    );

    Ok(tasks)
}

fn ensure_matrix_values(owner: &str, matrix: &Matrix) -> Result<()> {
    for (key, values) in matrix.iter() {
        if values.is_empty() {
            return Err(NanoflowError::ConfigError(format!(
                "{owner} matrix key '{key}' has no values"
            )));
        }
    }
    Ok(())
}
