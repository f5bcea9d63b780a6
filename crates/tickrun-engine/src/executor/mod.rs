//! Task execution: one [`Executor`] per task kind, looked up in a registry.
//!
//! [`ExecutorRegistry::execute`] is the boundary between the engine and task
//! code. Whatever happens behind it (an error, a panic, a hang) comes back as
//! a terminal [`TaskResult`].

mod callback;
mod ping;
mod process;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, warn};

use tickrun_core::{TaskDefinition, TaskKind, TaskResult};

use crate::memory;

pub use callback::{Callback, CallbackExecutor};
pub use ping::PingExecutor;
pub use process::{ProcessExecutor, ShellExecutor};

/// Errors an executor raises for faults outside the task's own logic.
///
/// Every variant ends up as an Exception result.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Failed to spawn process: {0}")]
    SpawnError(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unknown callback: {0}")]
    UnknownCallback(String),
}

/// What the task's own logic reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Execution {
    Succeeded {
        output: Option<String>,
    },
    Failed {
        description: String,
        output: Option<String>,
    },
}

/// Runs tasks of one kind.
#[async_trait]
pub trait Executor: Send + Sync {
    /// Kind this executor is registered under.
    fn kind(&self) -> TaskKind;

    /// Run the task once. Faults are returned as `Err`, never swallowed.
    async fn execute(&self, task: &TaskDefinition) -> Result<Execution, ExecutorError>;
}

/// Lookup table from task kind to executor, filled at schedule-build time.
#[derive(Clone, Default)]
pub struct ExecutorRegistry {
    executors: HashMap<TaskKind, Arc<dyn Executor>>,
}

impl ExecutorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the shell, process and ping executors.
    pub fn with_defaults() -> Self {
        Self::new()
            .with_executor(ShellExecutor::new())
            .with_executor(ProcessExecutor::new())
            .with_executor(PingExecutor::new())
    }

    /// Builder method to register an executor under its own kind.
    pub fn with_executor(mut self, executor: impl Executor + 'static) -> Self {
        self.register(Arc::new(executor));
        self
    }

    /// Register an executor, replacing any previous one for the same kind.
    pub fn register(&mut self, executor: Arc<dyn Executor>) {
        let kind = executor.kind();
        debug!(kind = %kind, "Registering executor");
        self.executors.insert(kind, executor);
    }

    pub fn get(&self, kind: &TaskKind) -> Option<Arc<dyn Executor>> {
        self.executors.get(kind).cloned()
    }

    pub fn contains(&self, kind: &TaskKind) -> bool {
        self.executors.contains_key(kind)
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<TaskKind> = self.executors.keys().cloned().collect();
        kinds.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        kinds
    }

    /// Execute a task and always produce a terminal result.
    ///
    /// The executor runs on its own tokio task so a panic is caught as a
    /// `JoinError` and a timeout can abort it without touching other tasks.
    pub async fn execute(&self, task: &Arc<TaskDefinition>) -> TaskResult {
        let started_at = Utc::now();
        let clock = Instant::now();
        let memory_before = memory::resident_bytes();

        let result = match self.get(&task.kind) {
            Some(executor) => run_contained(executor, Arc::clone(task)).await,
            None => TaskResult::exception(
                task.id.clone(),
                format!("No executor registered for kind '{}'", task.kind),
                None,
            ),
        };

        result.with_timing(started_at, clock.elapsed(), memory::delta_since(memory_before))
    }
}

impl fmt::Debug for ExecutorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

async fn run_contained(executor: Arc<dyn Executor>, task: Arc<TaskDefinition>) -> TaskResult {
    let task_id = task.id.clone();
    let timeout = task.timeout;
    let mut handle = tokio::spawn(async move { executor.execute(&task).await });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
            Ok(joined) => joined,
            Err(_) => {
                // Dropping the executor future kills any child process (kill_on_drop).
                handle.abort();
                warn!(task_id = %task_id, timeout = ?limit, "Task timed out, cancelled");
                return TaskResult::failure(task_id, format!("Timed out after {:?}", limit), None);
            }
        },
        None => handle.await,
    };

    match joined {
        Ok(Ok(Execution::Succeeded { output })) => TaskResult::success(task_id, output),
        Ok(Ok(Execution::Failed {
            description,
            output,
        })) => TaskResult::failure(task_id, description, output),
        Ok(Err(e)) => {
            warn!(task_id = %task_id, error = %e, "Task raised an error");
            TaskResult::exception(task_id, e.to_string(), Some(format!("{:?}", e)))
        }
        Err(join_error) if join_error.is_panic() => {
            let message = panic_message(join_error.into_panic());
            warn!(task_id = %task_id, panic = %message, "Task panicked");
            TaskResult::exception(task_id, format!("Task panicked: {}", message), None)
        }
        Err(join_error) => TaskResult::exception(task_id, join_error.to_string(), None),
    }
}

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Deserialize a task payload into an executor's payload type.
pub(crate) fn parse_payload<T: serde::de::DeserializeOwned>(
    task: &TaskDefinition,
) -> Result<T, ExecutorError> {
    serde_json::from_value(task.payload.clone()).map_err(|e| {
        ExecutorError::InvalidPayload(format!("task '{}' ({}): {}", task.id, task.kind, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tickrun_core::ResultStatus;

    struct Scripted {
        behavior: &'static str,
    }

    #[async_trait]
    impl Executor for Scripted {
        fn kind(&self) -> TaskKind {
            TaskKind::new("scripted")
        }

        async fn execute(&self, _task: &TaskDefinition) -> Result<Execution, ExecutorError> {
            match self.behavior {
                "ok" => Ok(Execution::Succeeded {
                    output: Some("done".into()),
                }),
                "fail" => Ok(Execution::Failed {
                    description: "Exit 3".into(),
                    output: None,
                }),
                "error" => Err(ExecutorError::InvalidPayload("missing 'command'".into())),
                "hang" => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Execution::Succeeded { output: None })
                }
                _ => panic!("scripted panic"),
            }
        }
    }

    fn task() -> Arc<TaskDefinition> {
        Arc::new(TaskDefinition::cron("t", "scripted", "* * * * *").unwrap())
    }

    fn registry(behavior: &'static str) -> ExecutorRegistry {
        ExecutorRegistry::new().with_executor(Scripted { behavior })
    }

    #[tokio::test]
    async fn test_success_and_failure_map_to_status() {
        let ok = registry("ok").execute(&task()).await;
        assert_eq!(ok.status, ResultStatus::Success);
        assert_eq!(ok.output.as_deref(), Some("done"));

        let failed = registry("fail").execute(&task()).await;
        assert_eq!(failed.status, ResultStatus::Failure);
        assert_eq!(failed.description, "Exit 3");
    }

    #[tokio::test]
    async fn test_error_becomes_exception() {
        let result = registry("error").execute(&task()).await;
        assert_eq!(result.status, ResultStatus::Exception);
        assert!(result.description.contains("missing 'command'"));
        assert!(result.exception_detail.is_some());
    }

    #[tokio::test]
    async fn test_panic_becomes_exception() {
        let result = registry("panic").execute(&task()).await;
        assert_eq!(result.status, ResultStatus::Exception);
        assert!(result.description.contains("scripted panic"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_cancels_and_fails() {
        let task = Arc::new(
            TaskDefinition::cron("t", "scripted", "* * * * *")
                .unwrap()
                .with_timeout(Duration::from_secs(5)),
        );
        let result = registry("hang").execute(&task).await;
        assert_eq!(result.status, ResultStatus::Failure);
        assert!(result.description.starts_with("Timed out after"));
    }

    #[tokio::test]
    async fn test_unregistered_kind_is_exception() {
        let result = ExecutorRegistry::new().execute(&task()).await;
        assert_eq!(result.status, ResultStatus::Exception);
        assert!(result.description.contains("scripted"));
    }

    #[test]
    fn test_defaults_register_builtin_kinds() {
        let registry = ExecutorRegistry::with_defaults();
        assert!(registry.contains(&TaskKind::from(TaskKind::COMMAND)));
        assert!(registry.contains(&TaskKind::from(TaskKind::PROCESS)));
        assert!(registry.contains(&TaskKind::from(TaskKind::PING)));
        assert!(!registry.contains(&TaskKind::from(TaskKind::CALLBACK)));
    }
}
