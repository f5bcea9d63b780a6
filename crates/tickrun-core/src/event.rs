//! Lifecycle notifications emitted by the engine during a tick.

use std::sync::Mutex;

use crate::{ResultStatus, RunContext, TaskId, TaskRunContext};

/// Observer of a tick's lifecycle.
///
/// Called synchronously in the fixed order before-run, then
/// {before-task, after-task} per due task, then after-run. A whole-run skip
/// emits only before-run and after-run.
pub trait RunObserver: Send + Sync {
    fn before_run(&self, _context: &RunContext) {}

    fn after_run(&self, _context: &RunContext) {}

    fn before_task(&self, _context: &TaskRunContext) {}

    fn after_task(&self, _context: &TaskRunContext) {}
}

/// One recorded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    BeforeRun,
    AfterRun,
    BeforeTask(TaskId),
    AfterTask(TaskId, ResultStatus),
}

/// Observer that records the notification sequence.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<LifecycleEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events seen so far.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, event: LifecycleEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}

impl RunObserver for RecordingObserver {
    fn before_run(&self, _context: &RunContext) {
        self.push(LifecycleEvent::BeforeRun);
    }

    fn after_run(&self, _context: &RunContext) {
        self.push(LifecycleEvent::AfterRun);
    }

    fn before_task(&self, context: &TaskRunContext) {
        self.push(LifecycleEvent::BeforeTask(context.task().id.clone()));
    }

    fn after_task(&self, context: &TaskRunContext) {
        // After-task always carries a result; Skipped is a harmless fallback.
        let status = context
            .result()
            .map_or(ResultStatus::Skipped, |r| r.status);
        self.push(LifecycleEvent::AfterTask(context.task().id.clone(), status));
    }
}
