//! tickrun Run Engine
//!
//! Drives one tick of a schedule: selects due tasks, gates them through
//! conditions and overlap locks, executes them through the executor
//! registry and reports each step to the registered observers.
//!
//! The engine has no timer loop of its own; the host decides when to tick.

pub mod engine;
pub mod executor;
pub mod lock;
pub mod memory;
pub mod schedule;

pub use engine::{
    BackgroundRuns, EngineError, RunEngine, RunOptions, TickOutcome, LOCK_HELD_REASON,
};
pub use executor::{
    CallbackExecutor, Execution, Executor, ExecutorError, ExecutorRegistry, PingExecutor,
    ProcessExecutor, ShellExecutor,
};
pub use lock::{
    FileLockProvider, InMemoryLockProvider, LockError, LockGuard, LockProvider, LockToken,
};
pub use schedule::{Schedule, ScheduleBuilder};
