//! One tick of a schedule.
//!
//! A tick goes `Evaluating → (SkippedWhole | Running) → Completed`:
//! schedule-wide conditions may skip the whole run, otherwise the due tasks
//! run one after another (or are launched in the background) and every due
//! task yields exactly one [`TaskResult`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use tickrun_core::{
    ConditionContext, DueTimeEvaluator, RunContext, RunId, RunObserver, TaskDefinition, TaskId,
    TaskResult, TaskRunContext, TaskSummary,
};

use crate::executor::panic_message;
use crate::lock::{LockError, LockGuard, LockProvider};
use crate::memory;
use crate::schedule::Schedule;

/// Reason recorded when a task's overlap lock is held elsewhere.
pub const LOCK_HELD_REASON: &str = "Task already running (overlap lock held)";

/// Errors that abort a whole tick.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The lock backend is unavailable.
    #[error("Lock provider error: {0}")]
    Lock(#[from] LockError),

    /// Run-by-id named a task the schedule does not have.
    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),
}

/// Per-tick options.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Treat every task as due.
    pub force: bool,
    /// Run exactly this task, bypassing due-time evaluation.
    pub task_id: Option<TaskId>,
    /// Reference time; the current time when `None`.
    pub now: Option<DateTime<Utc>>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method to force all tasks due.
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }

    /// Builder method to run a single task by id.
    pub fn with_task(mut self, task_id: impl Into<TaskId>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    /// Builder method to pin the reference time.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }
}

/// Handles of the background runs a tick launched.
#[derive(Debug, Default)]
pub struct BackgroundRuns {
    handles: Vec<(TaskId, JoinHandle<TaskResult>)>,
}

impl BackgroundRuns {
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId> {
        self.handles.iter().map(|(id, _)| id)
    }

    fn push(&mut self, task_id: TaskId, handle: JoinHandle<TaskResult>) {
        self.handles.push((task_id, handle));
    }

    /// Wait for every background run and collect their real results.
    pub async fn wait(self) -> Vec<TaskResult> {
        let mut results = Vec::with_capacity(self.handles.len());
        for (task_id, handle) in self.handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => TaskResult::exception(
                    task_id,
                    format!("Background run did not complete: {}", e),
                    None,
                ),
            };
            results.push(result);
        }
        results
    }
}

/// What a tick produced.
#[derive(Debug)]
pub struct TickOutcome {
    /// The completed run context.
    pub context: RunContext,
    /// Still-running background tasks.
    pub background: BackgroundRuns,
}

/// Drives ticks of one schedule.
pub struct RunEngine {
    schedule: Schedule,
    locks: Arc<dyn LockProvider>,
    observers: Vec<Arc<dyn RunObserver>>,
}

impl RunEngine {
    /// Create a new RunEngine with no observers.
    pub fn new(schedule: Schedule, locks: Arc<dyn LockProvider>) -> Self {
        Self {
            schedule,
            locks,
            observers: Vec::new(),
        }
    }

    /// Builder method to append an observer. Observers are notified in order.
    pub fn with_observer(mut self, observer: Arc<dyn RunObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// Summaries of the tasks due at `now`, without running anything.
    pub fn list_due(&self, now: DateTime<Utc>) -> Vec<TaskSummary> {
        DueTimeEvaluator::evaluate(self.schedule.tasks().iter().map(Arc::as_ref), now)
            .into_iter()
            .map(|task| task.summary())
            .collect()
    }

    /// Run one tick.
    pub async fn run(&self, options: RunOptions) -> Result<TickOutcome, EngineError> {
        let now = options.now.unwrap_or_else(Utc::now);
        let clock = Instant::now();
        let memory_before = memory::resident_bytes();

        let mut context = RunContext::new(self.schedule.len(), options.force);
        let mut background = BackgroundRuns::default();
        let run_id = context.run_id().clone();
        let conditions = ConditionContext::new(now, self.schedule.environment());

        let selected = match &options.task_id {
            Some(id) => Some(
                self.schedule
                    .get(id)
                    .cloned()
                    .ok_or_else(|| EngineError::TaskNotFound(id.clone()))?,
            ),
            None => None,
        };

        // Evaluating
        if let Some(condition) = self
            .schedule
            .conditions()
            .iter()
            .find(|c| !c.evaluate(&conditions))
        {
            info!(run_id = %run_id, reason = %condition.describe(), "Run skipped");
            context.skip(condition.describe());
            context.complete(clock.elapsed(), memory::delta_since(memory_before));
            self.notify(|o| o.before_run(&context));
            self.notify(|o| o.after_run(&context));
            return Ok(TickOutcome {
                context,
                background,
            });
        }

        let due: Vec<Arc<TaskDefinition>> = match selected {
            Some(task) => vec![task],
            None if options.force => self.schedule.tasks().to_vec(),
            None => DueTimeEvaluator::evaluate(self.schedule.tasks().iter().cloned(), now),
        };

        if due.iter().any(|t| t.without_overlapping.is_some()) {
            self.locks.check().await?;
        }

        context.set_due_tasks(due.iter().map(|t| t.summary()).collect());
        info!(
            run_id = %run_id,
            due = due.len(),
            total = self.schedule.len(),
            force = options.force,
            "Tick started"
        );
        self.notify(|o| o.before_run(&context));

        // Running
        for task in due {
            let task_context = TaskRunContext::new(&context, task.summary());
            self.notify(|o| o.before_task(&task_context));

            let result = self
                .run_task(&run_id, task, &conditions, &mut background)
                .await;

            let task_context = task_context.with_result(result.clone());
            context.push_result(result);
            self.notify(|o| o.after_task(&task_context));
        }

        // Completed
        context.complete(clock.elapsed(), memory::delta_since(memory_before));
        info!(
            run_id = %run_id,
            ran = context.run().len(),
            succeeded = context.successful().len(),
            skipped = context.skipped().len(),
            failed = context.failures().len(),
            background = background.len(),
            duration = %context.formatted_duration(),
            "Tick completed"
        );
        self.notify(|o| o.after_run(&context));

        Ok(TickOutcome {
            context,
            background,
        })
    }

    async fn run_task(
        &self,
        run_id: &RunId,
        task: Arc<TaskDefinition>,
        conditions: &ConditionContext<'_>,
        background: &mut BackgroundRuns,
    ) -> TaskResult {
        if let Some(condition) = task.conditions.iter().find(|c| !c.evaluate(conditions)) {
            debug!(run_id = %run_id, task_id = %task.id, reason = %condition.describe(), "Task skipped");
            return TaskResult::skipped(task.id.clone(), condition.describe());
        }

        let guard = match task.without_overlapping {
            Some(ttl) => {
                match LockGuard::try_acquire(Arc::clone(&self.locks), task.id.as_str(), ttl).await {
                    Ok(Some(guard)) => Some(guard),
                    Ok(None) => {
                        warn!(run_id = %run_id, task_id = %task.id, "Task already running, skipped");
                        return TaskResult::skipped(task.id.clone(), LOCK_HELD_REASON);
                    }
                    // The tick is already under way; report the task and carry on.
                    Err(e) => {
                        warn!(run_id = %run_id, task_id = %task.id, error = %e, "Overlap lock unavailable");
                        return TaskResult::exception(
                            task.id.clone(),
                            format!("Lock provider error: {}", e),
                            None,
                        );
                    }
                }
            }
            None => None,
        };

        let registry = Arc::clone(self.schedule.registry());

        if task.run_in_background {
            info!(run_id = %run_id, task_id = %task.id, kind = %task.kind, "Launching task in background");
            let task_id = task.id.clone();
            let run_id = run_id.clone();
            let handle = tokio::spawn(async move {
                let result = registry.execute(&task).await;
                release(guard, &task.id).await;
                run_hooks(&task, &result);
                info!(
                    run_id = %run_id,
                    task_id = %task.id,
                    status = %result.status,
                    "Background task finished"
                );
                result
            });
            background.push(task_id.clone(), handle);
            return TaskResult::launched(task_id);
        }

        info!(run_id = %run_id, task_id = %task.id, kind = %task.kind, "Running task");
        let result = registry.execute(&task).await;
        release(guard, &task.id).await;
        run_hooks(&task, &result);

        if result.is_failure() {
            warn!(
                run_id = %run_id,
                task_id = %task.id,
                status = %result.status,
                description = %result.description,
                "Task failed"
            );
        } else {
            info!(run_id = %run_id, task_id = %task.id, duration = %result.formatted_duration(), "Task succeeded");
        }
        result
    }

    fn notify(&self, event: impl Fn(&dyn RunObserver)) {
        for observer in &self.observers {
            event(observer.as_ref());
        }
    }
}

impl std::fmt::Debug for RunEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunEngine")
            .field("schedule", &self.schedule)
            .field("observers", &self.observers.len())
            .finish()
    }
}

/// Release a task's overlap lock; the TTL covers a failed release.
async fn release(guard: Option<LockGuard>, task_id: &TaskId) {
    if let Some(guard) = guard {
        if let Err(e) = guard.release().await {
            warn!(task_id = %task_id, error = %e, "Failed to release overlap lock");
        }
    }
}

fn run_hooks(task: &TaskDefinition, result: &TaskResult) {
    for hook in task.hooks.for_result(result) {
        if let Err(payload) = std::panic::catch_unwind(AssertUnwindSafe(|| hook(result))) {
            warn!(
                task_id = %task.id,
                panic = %panic_message(payload),
                "Task hook panicked"
            );
        }
    }
}
