// src/exec/command.rs

//! Shell command procedure.

use std::fmt;
use std::process::Stdio;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{info, warn};

use crate::errors::TaskError;
use crate::exec::task::{Work, WorkFuture};

/// Receives every line a running command writes, as `(task name, raw line)`.
///
/// Lines keep their trailing newline. Used by display front ends to stream
/// task logs while the command runs.
pub type UpdateHook = Arc<dyn Fn(&str, &[u8]) + Send + Sync>;

/// A shell command line run on behalf of a task.
#[derive(Clone)]
pub struct ShellCommand {
    task: String,
    line: String,
    envs: Vec<(String, String)>,
    hook: Option<UpdateHook>,
}

impl fmt::Debug for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShellCommand")
            .field("task", &self.task)
            .field("line", &self.line)
            .field("envs", &self.envs)
            .field("has_hook", &self.hook.is_some())
            .finish()
    }
}

impl ShellCommand {
    pub fn new(task: impl Into<String>, line: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            line: line.into(),
            envs: Vec::new(),
            hook: None,
        }
    }

    /// Set an extra environment variable for the child process.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Stream output to `hook` instead of inheriting the parent's stdio.
    pub fn with_hook(mut self, hook: Option<UpdateHook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn task(&self) -> &str {
        &self.task
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn envs(&self) -> &[(String, String)] {
        &self.envs
    }

    /// Run the command to completion.
    ///
    /// A non-zero exit status is a [`TaskError::NonZeroExit`].
    pub async fn run(&self) -> Result<(), TaskError> {
        info!(task = %self.task, cmd = %self.line, "starting task process");

        // Build a shell command appropriate for the platform.
        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.line);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.line);
            c
        };

        cmd.envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .kill_on_drop(true);
        if self.hook.is_some() {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        }

        let mut child = cmd.spawn().map_err(|source| TaskError::Spawn {
            task: self.task.clone(),
            source,
        })?;

        if let Some(hook) = &self.hook {
            let stdout = child.stdout.take();
            let stderr = child.stderr.take();
            let (out, err) = tokio::join!(
                forward_lines(&self.task, stdout, hook),
                forward_lines(&self.task, stderr, hook),
            );
            if let Err(e) = out.and(err) {
                warn!(task = %self.task, error = %e, "failed to read task output");
            }
        }

        let status = child.wait().await.map_err(|e| TaskError::Failed {
            task: self.task.clone(),
            reason: format!("waiting for process: {e}"),
        })?;
        let code = status.code().unwrap_or(-1);

        info!(
            task = %self.task,
            exit_code = code,
            success = status.success(),
            "task process exited"
        );

        if status.success() {
            Ok(())
        } else {
            Err(TaskError::NonZeroExit {
                task: self.task.clone(),
                code,
            })
        }
    }

    /// Turn the command into a task work procedure.
    pub fn into_work(self) -> Work<()> {
        let command = Arc::new(self);
        Arc::new(move || -> WorkFuture<()> {
            let command = Arc::clone(&command);
            Box::pin(async move { command.run().await })
        })
    }
}

async fn forward_lines<R>(task: &str, pipe: Option<R>, hook: &UpdateHook) -> std::io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let Some(pipe) = pipe else {
        return Ok(());
    };

    let mut reader = BufReader::new(pipe);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            return Ok(());
        }
        hook(task, &line);
    }
}
