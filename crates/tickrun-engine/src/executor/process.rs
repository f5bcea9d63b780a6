//! Shell command and external process executors.

use std::collections::HashMap;
use std::process::Stdio;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info};

use tickrun_core::{TaskDefinition, TaskKind};

use super::{parse_payload, Execution, Executor, ExecutorError};

/// Payload of a `command` task.
#[derive(Debug, Deserialize)]
struct ShellPayload {
    command: String,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Payload of a `process` task.
#[derive(Debug, Deserialize)]
struct ProcessPayload {
    program: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    cwd: Option<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

/// Runs a command line through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellExecutor {
    /// Path to the shell.
    shell: String,
}

impl ShellExecutor {
    /// Create a new executor using `sh`.
    pub fn new() -> Self {
        Self {
            shell: "sh".to_string(),
        }
    }

    /// Builder method to use a different shell (must accept `-c`).
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Executor for ShellExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::from(TaskKind::COMMAND)
    }

    async fn execute(&self, task: &TaskDefinition) -> Result<Execution, ExecutorError> {
        let payload: ShellPayload = parse_payload(task)?;

        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c").arg(&payload.command);
        configure(&mut cmd, payload.cwd.as_deref(), &payload.env);

        info!(task_id = %task.id, command = %payload.command, "Running shell command");
        run_to_completion(cmd).await
    }
}

/// Runs a program with explicit arguments, no shell involved.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::from(TaskKind::PROCESS)
    }

    async fn execute(&self, task: &TaskDefinition) -> Result<Execution, ExecutorError> {
        let payload: ProcessPayload = parse_payload(task)?;

        let mut cmd = Command::new(&payload.program);
        cmd.args(&payload.args);
        configure(&mut cmd, payload.cwd.as_deref(), &payload.env);

        info!(
            task_id = %task.id,
            program = %payload.program,
            args = ?payload.args,
            "Running process"
        );
        run_to_completion(cmd).await
    }
}

fn configure(cmd: &mut Command, cwd: Option<&str>, env: &HashMap<String, String>) {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        // A timed-out task is cancelled by dropping this future; take the child with it.
        .kill_on_drop(true);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    for (key, value) in env {
        cmd.env(key, value);
    }
}

async fn run_to_completion(mut cmd: Command) -> Result<Execution, ExecutorError> {
    let output = cmd.output().await?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let combined = format!("{}{}", stdout, stderr);
    let captured = if combined.trim().is_empty() {
        None
    } else {
        Some(combined)
    };

    debug!(status = ?output.status, "Process exited");

    if output.status.success() {
        return Ok(Execution::Succeeded { output: captured });
    }

    let mut description = match output.status.code() {
        Some(code) => format!("Exit {}", code),
        None => "Terminated by signal".to_string(),
    };
    if let Some(line) = stderr.lines().map(str::trim).find(|l| !l.is_empty()) {
        description.push_str(": ");
        description.push_str(line);
    }

    Ok(Execution::Failed {
        description,
        output: captured,
    })
}
