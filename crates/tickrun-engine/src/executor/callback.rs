//! In-process callback executor.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use tickrun_core::{TaskDefinition, TaskKind};

use super::{parse_payload, Execution, Executor, ExecutorError};

/// A named callback. `Ok` carries optional output, `Err` a failure description.
pub type Callback = Arc<dyn Fn() -> Result<Option<String>, String> + Send + Sync>;

#[derive(Debug, Deserialize)]
struct CallbackPayload {
    callback: String,
}

/// Runs closures registered by name; payload `{"callback": "<name>"}`.
///
/// Callbacks run on tokio's blocking pool and cannot be interrupted. When a
/// task timeout fires, the task is reported as timed out and its overlap lock
/// is released, but the closure keeps running on its thread until it returns.
/// Callbacks that may run long should bound their own work.
#[derive(Clone, Default)]
pub struct CallbackExecutor {
    callbacks: HashMap<String, Callback>,
}

impl CallbackExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to register a callback.
    pub fn with_callback<F>(mut self, name: impl Into<String>, callback: F) -> Self
    where
        F: Fn() -> Result<Option<String>, String> + Send + Sync + 'static,
    {
        self.callbacks.insert(name.into(), Arc::new(callback));
        self
    }
}

impl fmt::Debug for CallbackExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.callbacks.keys().collect();
        names.sort();
        f.debug_struct("CallbackExecutor")
            .field("callbacks", &names)
            .finish()
    }
}

#[async_trait]
impl Executor for CallbackExecutor {
    fn kind(&self) -> TaskKind {
        TaskKind::from(TaskKind::CALLBACK)
    }

    async fn execute(&self, task: &TaskDefinition) -> Result<Execution, ExecutorError> {
        let payload: CallbackPayload = parse_payload(task)?;
        let callback = self
            .callbacks
            .get(&payload.callback)
            .cloned()
            .ok_or_else(|| ExecutorError::UnknownCallback(payload.callback.clone()))?;

        info!(task_id = %task.id, callback = %payload.callback, "Running callback");

        // Off the async workers; a panic is re-raised so the registry reports it.
        let outcome = match tokio::task::spawn_blocking(move || callback()).await {
            Ok(outcome) => outcome,
            Err(join_error) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Err(join_error) => {
                return Err(ExecutorError::SpawnError(std::io::Error::other(
                    join_error.to_string(),
                )))
            }
        };

        Ok(match outcome {
            Ok(output) => Execution::Succeeded { output },
            Err(description) => Execution::Failed {
                description,
                output: None,
            },
        })
    }
}
