//! The validated, immutable set of task definitions a tick runs against.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use tickrun_core::{Condition, ConfigError, TaskDefinition, TaskId};

use crate::executor::ExecutorRegistry;

/// Collects definitions and schedule-wide settings, validated by [`build`](Self::build).
#[derive(Debug, Default)]
pub struct ScheduleBuilder {
    tasks: Vec<TaskDefinition>,
    conditions: Vec<Condition>,
    registry: ExecutorRegistry,
    environment: Option<String>,
}

impl ScheduleBuilder {
    /// Create a new ScheduleBuilder resolving kinds against `registry`.
    pub fn new(registry: ExecutorRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    /// Builder method to add a task definition.
    pub fn add_task(mut self, task: TaskDefinition) -> Self {
        self.tasks.push(task);
        self
    }

    /// Builder method to add a schedule-wide condition.
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Builder method to set the environment name conditions are checked against.
    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Validate and freeze the schedule.
    pub fn build(self) -> Result<Schedule, ConfigError> {
        let mut seen = HashSet::new();
        for task in &self.tasks {
            if !seen.insert(task.id.clone()) {
                return Err(ConfigError::DuplicateTask(task.id.to_string()));
            }
            if !self.registry.contains(&task.kind) {
                return Err(ConfigError::UnknownKind {
                    task_id: task.id.to_string(),
                    kind: task.kind.to_string(),
                });
            }
        }

        debug!(
            tasks = self.tasks.len(),
            conditions = self.conditions.len(),
            environment = ?self.environment,
            "Schedule built"
        );

        Ok(Schedule {
            tasks: self.tasks.into_iter().map(Arc::new).collect(),
            conditions: self.conditions,
            registry: Arc::new(self.registry),
            environment: self.environment,
        })
    }
}

/// A validated schedule. Task ids are unique and every kind has an executor.
#[derive(Debug, Clone)]
pub struct Schedule {
    tasks: Vec<Arc<TaskDefinition>>,
    conditions: Vec<Condition>,
    registry: Arc<ExecutorRegistry>,
    environment: Option<String>,
}

impl Schedule {
    /// Definitions in insertion order.
    pub fn tasks(&self) -> &[Arc<TaskDefinition>] {
        &self.tasks
    }

    pub fn get(&self, id: &TaskId) -> Option<&Arc<TaskDefinition>> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Schedule-wide conditions, checked before any task.
    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn registry(&self) -> &Arc<ExecutorRegistry> {
        &self.registry
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }
}
