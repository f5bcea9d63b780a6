//! Outcome record of one task execution attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::format::{format_duration, format_memory};
use crate::{ResultStatus, TaskId};

/// Immutable terminal outcome of one due task in one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Task this result belongs to.
    pub task_id: TaskId,

    /// Terminal status.
    pub status: ResultStatus,

    /// Human-readable description ("Exit 1: ...", skip reason, exception message).
    pub description: String,

    /// Captured output, if the executor produced any.
    pub output: Option<String>,

    /// Extra detail for exceptions (error source chain, panic payload).
    pub exception_detail: Option<String>,

    /// When the attempt started.
    pub started_at: DateTime<Utc>,

    /// Wall time spent on the attempt.
    pub duration: Duration,

    /// Change in resident memory across the attempt, in bytes.
    pub memory_delta: i64,
}

impl TaskResult {
    fn new(task_id: TaskId, status: ResultStatus, description: impl Into<String>) -> Self {
        Self {
            task_id,
            status,
            description: description.into(),
            output: None,
            exception_detail: None,
            started_at: Utc::now(),
            duration: Duration::ZERO,
            memory_delta: 0,
        }
    }

    /// The task ran and succeeded.
    pub fn success(task_id: TaskId, output: Option<String>) -> Self {
        Self {
            output,
            ..Self::new(task_id, ResultStatus::Success, "Successful")
        }
    }

    /// The task ran and reported an unsuccessful outcome.
    pub fn failure(
        task_id: TaskId,
        description: impl Into<String>,
        output: Option<String>,
    ) -> Self {
        Self {
            output,
            ..Self::new(task_id, ResultStatus::Failure, description)
        }
    }

    /// An unexpected fault escaped the task.
    pub fn exception(
        task_id: TaskId,
        description: impl Into<String>,
        detail: Option<String>,
    ) -> Self {
        let description = description.into();
        let description = if description.is_empty() {
            "Unknown error".to_string()
        } else {
            description
        };
        Self {
            exception_detail: detail,
            ..Self::new(task_id, ResultStatus::Exception, description)
        }
    }

    /// A background task was launched; its real outcome is not known yet.
    pub fn launched(task_id: TaskId) -> Self {
        Self::new(task_id, ResultStatus::Success, "Launched in background")
    }

    /// The task did not run.
    pub fn skipped(task_id: TaskId, reason: impl Into<String>) -> Self {
        Self::new(task_id, ResultStatus::Skipped, reason)
    }

    /// Builder method to attach timing and memory measurements.
    pub fn with_timing(
        mut self,
        started_at: DateTime<Utc>,
        duration: Duration,
        memory_delta: i64,
    ) -> Self {
        self.started_at = started_at;
        self.duration = duration;
        self.memory_delta = memory_delta;
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ResultStatus::Success
    }

    /// Failure or Exception.
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    pub fn is_exception(&self) -> bool {
        self.status == ResultStatus::Exception
    }

    pub fn is_skipped(&self) -> bool {
        self.status == ResultStatus::Skipped
    }

    /// True unless the task was skipped.
    pub fn has_run(&self) -> bool {
        self.status.has_run()
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration)
    }

    pub fn formatted_memory(&self) -> String {
        format_memory(self.memory_delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_status() {
        let id = TaskId::new("t");
        assert!(TaskResult::success(id.clone(), None).is_success());
        assert!(TaskResult::failure(id.clone(), "Exit 1", None).is_failure());
        let ex = TaskResult::exception(id.clone(), "boom", Some("trace".into()));
        assert!(ex.is_exception() && ex.is_failure());
        assert_eq!(ex.exception_detail.as_deref(), Some("trace"));
        let skipped = TaskResult::skipped(id, "outside window");
        assert!(skipped.is_skipped());
        assert!(!skipped.has_run());
        assert_eq!(skipped.description, "outside window");
    }

    #[test]
    fn test_exception_description_never_empty() {
        let ex = TaskResult::exception(TaskId::new("t"), "", None);
        assert!(!ex.description.is_empty());
    }

    #[test]
    fn test_with_timing() {
        let started = Utc::now();
        let result = TaskResult::success(TaskId::new("t"), Some("ok".into())).with_timing(
            started,
            Duration::from_secs(2),
            2048,
        );
        assert_eq!(result.started_at, started);
        assert_eq!(result.formatted_duration(), "2 secs");
        assert_eq!(result.formatted_memory(), "2.0 KB");
    }
}
