//! tickrun Core Domain Types
//!
//! This crate contains pure domain types with no dependencies on:
//! - An async runtime
//! - Process spawning or network I/O
//! - Lock backends
//!
//! Everything needed to decide *what* is due and to describe *what happened*
//! during a tick lives here; the engine crate decides *how* it runs.

pub mod condition;
pub mod context;
pub mod definition;
pub mod due;
pub mod error;
pub mod event;
pub mod format;
pub mod ids;
pub mod result;
pub mod rule;
pub mod status;

// Re-export commonly used types
pub use condition::{Condition, ConditionContext, ConditionKind};
pub use context::{RunContext, TaskRunContext};
pub use definition::{TaskDefinition, TaskHook, TaskHooks, TaskSummary};
pub use due::DueTimeEvaluator;
pub use error::{ConfigError, RuleError};
pub use event::{LifecycleEvent, RecordingObserver, RunObserver};
pub use ids::{RunId, TaskId, TaskKind};
pub use result::TaskResult;
pub use rule::{CronExpression, ScheduleRule, ScheduleTimezone};
pub use status::ResultStatus;
