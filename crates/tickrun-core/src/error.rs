//! Core domain errors.

use thiserror::Error;

/// Errors raised while parsing a cron expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleError {
    /// Expression is empty.
    #[error("Empty schedule expression")]
    Empty,

    /// Wrong number of fields.
    #[error("Expected 5 fields (MIN HOUR DOM MON DOW), got {0}")]
    FieldCount(usize),

    /// Unrecognized `@` or `#` macro.
    #[error("Unknown schedule macro: {0}")]
    UnknownMacro(String),

    /// A field value could not be parsed.
    #[error("Invalid {field} value '{value}'")]
    InvalidValue { field: &'static str, value: String },

    /// A value lies outside the field's range.
    #[error("{field} value {value} out of range {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// A step of zero, or a range whose start exceeds its end.
    #[error("Invalid {field} range '{value}'")]
    InvalidRange { field: &'static str, value: String },

    /// Timezone spec is neither UTC, local, nor a fixed offset.
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// Schedule-build time configuration errors.
///
/// All of these are fatal: they abort before any tick runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A task's schedule rule does not parse.
    #[error("Invalid schedule for task '{task_id}': {source}")]
    InvalidRule {
        task_id: String,
        #[source]
        source: RuleError,
    },

    /// Two definitions share an id.
    #[error("Duplicate task id: {0}")]
    DuplicateTask(String),

    /// No executor is registered for the task's kind.
    #[error("No executor registered for kind '{kind}' (task '{task_id}')")]
    UnknownKind { task_id: String, kind: String },

    /// A condition could not be built.
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    /// Any other invalid configuration input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}
