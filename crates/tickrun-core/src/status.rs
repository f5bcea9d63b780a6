//! Terminal status of a task execution attempt.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a [`TaskResult`](crate::TaskResult).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultStatus {
    /// The task ran and reported success.
    Success,
    /// The task ran and its own logic reported an unsuccessful outcome.
    Failure,
    /// An unexpected fault escaped the task and was caught at the executor boundary.
    Exception,
    /// The task did not run (condition false or overlap lock held).
    Skipped,
}

impl ResultStatus {
    /// Returns true for Failure and Exception.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure | Self::Exception)
    }

    /// Returns true if the task actually ran.
    pub fn has_run(&self) -> bool {
        !matches!(self, Self::Skipped)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Exception => "exception",
            Self::Skipped => "skipped",
        };
        f.write_str(s)
    }
}
