//! Task definitions: the immutable description of one recurring unit of work.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::condition::Condition;
use crate::error::ConfigError;
use crate::rule::{ScheduleRule, ScheduleTimezone};
use crate::{TaskId, TaskKind, TaskResult};

/// Callback invoked synchronously once a task's result is known.
pub type TaskHook = Arc<dyn Fn(&TaskResult) + Send + Sync>;

/// Success/failure callbacks of a task.
#[derive(Clone, Default)]
pub struct TaskHooks {
    /// Run after a Success result.
    pub on_success: Vec<TaskHook>,
    /// Run after a Failure or Exception result.
    pub on_failure: Vec<TaskHook>,
}

impl TaskHooks {
    /// Hooks matching the result's status. Skipped results have none.
    pub fn for_result(&self, result: &TaskResult) -> &[TaskHook] {
        if result.is_success() {
            &self.on_success
        } else if result.is_failure() {
            &self.on_failure
        } else {
            &[]
        }
    }
}

impl fmt::Debug for TaskHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHooks")
            .field("on_success", &self.on_success.len())
            .field("on_failure", &self.on_failure.len())
            .finish()
    }
}

/// A recurring task.
#[derive(Debug, Clone)]
pub struct TaskDefinition {
    /// Unique task identifier; also the overlap lock name.
    pub id: TaskId,

    /// When the task is due.
    pub schedule: ScheduleRule,

    /// Selects the executor.
    pub kind: TaskKind,

    /// Executor input, opaque to the engine.
    pub payload: Value,

    /// Checked in order before running; the first false one skips the task.
    pub conditions: Vec<Condition>,

    /// Callbacks run after the result is known.
    pub hooks: TaskHooks,

    /// Overlap lock TTL. `None` allows overlapping runs.
    pub without_overlapping: Option<Duration>,

    /// Launch without blocking the rest of the tick.
    pub run_in_background: bool,

    /// Cancel the execution after this long.
    pub timeout: Option<Duration>,

    /// Human-readable label.
    pub description: String,
}

impl TaskDefinition {
    /// Default overlap lock TTL, one day.
    pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(24 * 60 * 60);

    /// Create a new TaskDefinition with an already parsed rule.
    pub fn new(id: impl Into<TaskId>, kind: impl Into<TaskKind>, schedule: ScheduleRule) -> Self {
        let id = id.into();
        Self {
            description: id.to_string(),
            id,
            schedule,
            kind: kind.into(),
            payload: Value::Null,
            conditions: Vec::new(),
            hooks: TaskHooks::default(),
            without_overlapping: None,
            run_in_background: false,
            timeout: None,
        }
    }

    /// Create a TaskDefinition from a single UTC cron expression.
    pub fn cron(
        id: impl Into<TaskId>,
        kind: impl Into<TaskKind>,
        expression: &str,
    ) -> Result<Self, ConfigError> {
        let id = id.into();
        let rule = parse_rule(&id, &[expression], ScheduleTimezone::Utc)?;
        Ok(Self::new(id, kind, rule))
    }

    /// Builder method to OR another expression into the schedule.
    pub fn also_at(mut self, expression: &str) -> Result<Self, ConfigError> {
        let extra = parse_rule(&self.id, &[expression], self.schedule.timezone())?;
        for e in extra.expressions() {
            self.schedule.push(e.clone());
        }
        Ok(self)
    }

    /// Builder method to set the timezone the rule is evaluated in.
    pub fn with_timezone(mut self, timezone: ScheduleTimezone) -> Self {
        self.schedule = self.schedule.with_timezone(timezone);
        self
    }

    /// Builder method to set the payload.
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }

    /// Builder method to set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder method to add a condition.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Builder method to forbid overlapping runs, with the lock expiring after `ttl`.
    pub fn without_overlapping(mut self, ttl: Duration) -> Self {
        self.without_overlapping = Some(ttl);
        self
    }

    /// Builder method to launch the task without blocking the tick.
    pub fn in_background(mut self) -> Self {
        self.run_in_background = true;
        self
    }

    /// Builder method to set the execution timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builder method to add a success hook.
    pub fn on_success<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TaskResult) + Send + Sync + 'static,
    {
        self.hooks.on_success.push(Arc::new(hook));
        self
    }

    /// Builder method to add a failure hook.
    pub fn on_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TaskResult) + Send + Sync + 'static,
    {
        self.hooks.on_failure.push(Arc::new(hook));
        self
    }

    /// Lightweight, owned view used in run contexts.
    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            id: self.id.clone(),
            kind: self.kind.clone(),
            description: self.description.clone(),
            schedule: self.schedule.to_string(),
        }
    }
}

fn parse_rule(
    id: &TaskId,
    expressions: &[&str],
    timezone: ScheduleTimezone,
) -> Result<ScheduleRule, ConfigError> {
    ScheduleRule::parse(expressions, timezone, id.as_str()).map_err(|source| {
        ConfigError::InvalidRule {
            task_id: id.to_string(),
            source,
        }
    })
}

/// What observers see of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub id: TaskId,
    pub kind: TaskKind,
    pub description: String,
    /// Rendered schedule rule.
    pub schedule: String,
}
