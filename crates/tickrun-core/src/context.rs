//! Aggregate record of one tick and the per-task notification payload.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::format::{format_duration, format_memory};
use crate::{RunId, TaskResult, TaskSummary};

/// Queryable record of one tick's due tasks and results.
///
/// Built fresh by the engine for every tick; the mutating methods are meant
/// for the engine only. All views are derived from `results` on demand.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: RunId,
    total_tasks: usize,
    due_tasks: Vec<TaskSummary>,
    results: Vec<TaskResult>,
    is_force_run: bool,
    skip_reason: Option<String>,
    started_at: DateTime<Utc>,
    duration: Duration,
    memory_delta: i64,
}

impl RunContext {
    /// Create a new RunContext for a schedule of `total_tasks` definitions.
    pub fn new(total_tasks: usize, is_force_run: bool) -> Self {
        Self {
            run_id: RunId::generate(),
            total_tasks,
            due_tasks: Vec::new(),
            results: Vec::new(),
            is_force_run,
            skip_reason: None,
            started_at: Utc::now(),
            duration: Duration::ZERO,
            memory_delta: 0,
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    /// Number of definitions in the schedule.
    pub fn total_tasks(&self) -> usize {
        self.total_tasks
    }

    pub fn due_tasks(&self) -> &[TaskSummary] {
        &self.due_tasks
    }

    pub fn results(&self) -> &[TaskResult] {
        &self.results
    }

    pub fn is_force_run(&self) -> bool {
        self.is_force_run
    }

    /// Reason the whole run was skipped, if it was.
    pub fn skip_reason(&self) -> Option<&str> {
        self.skip_reason.as_deref()
    }

    /// True if a schedule-wide condition skipped the whole run.
    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn memory_delta(&self) -> i64 {
        self.memory_delta
    }

    pub fn successful(&self) -> Vec<&TaskResult> {
        self.results.iter().filter(|r| r.is_success()).collect()
    }

    /// Failures and exceptions.
    pub fn failures(&self) -> Vec<&TaskResult> {
        self.results.iter().filter(|r| r.is_failure()).collect()
    }

    pub fn skipped(&self) -> Vec<&TaskResult> {
        self.results.iter().filter(|r| r.is_skipped()).collect()
    }

    /// Results of tasks that actually ran.
    pub fn run(&self) -> Vec<&TaskResult> {
        self.results.iter().filter(|r| r.has_run()).collect()
    }

    /// True iff no result is a Failure or Exception. Vacuously true when empty.
    pub fn is_successful(&self) -> bool {
        !self.results.iter().any(|r| r.is_failure())
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.duration)
    }

    pub fn formatted_memory(&self) -> String {
        format_memory(self.memory_delta)
    }

    /// Engine: set the tasks selected for this tick.
    pub fn set_due_tasks(&mut self, due_tasks: Vec<TaskSummary>) {
        self.due_tasks = due_tasks;
    }

    /// Engine: append a task's terminal result.
    pub fn push_result(&mut self, result: TaskResult) {
        self.results.push(result);
    }

    /// Engine: mark the whole run skipped.
    pub fn skip(&mut self, reason: impl Into<String>) {
        self.skip_reason = Some(reason.into());
    }

    /// Engine: record final measurements.
    pub fn complete(&mut self, duration: Duration, memory_delta: i64) {
        self.duration = duration;
        self.memory_delta = memory_delta;
    }
}

/// Payload of the before-task and after-task notifications.
#[derive(Debug, Clone)]
pub struct TaskRunContext {
    run_id: RunId,
    task: TaskSummary,
    is_force_run: bool,
    result: Option<TaskResult>,
}

impl TaskRunContext {
    /// Create the before-task payload.
    pub fn new(run: &RunContext, task: TaskSummary) -> Self {
        Self {
            run_id: run.run_id().clone(),
            task,
            is_force_run: run.is_force_run(),
            result: None,
        }
    }

    /// Builder method to attach the result for the after-task payload.
    pub fn with_result(mut self, result: TaskResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn task(&self) -> &TaskSummary {
        &self.task
    }

    pub fn is_force_run(&self) -> bool {
        self.is_force_run
    }

    /// The result; `None` before the task has run.
    pub fn result(&self) -> Option<&TaskResult> {
        self.result.as_ref()
    }

    pub fn formatted_duration(&self) -> String {
        format_duration(self.result.as_ref().map_or(Duration::ZERO, |r| r.duration))
    }

    pub fn formatted_memory(&self) -> String {
        format_memory(self.result.as_ref().map_or(0, |r| r.memory_delta))
    }
}
