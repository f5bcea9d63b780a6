//! JSON schedule files.
//!
//! ```json
//! {
//!   "conditions": [{ "type": "environment", "allowed": ["prod"] }],
//!   "tasks": [
//!     {
//!       "id": "backup",
//!       "kind": "command",
//!       "schedule": ["0 3 * * *", "0 15 * * 6"],
//!       "payload": { "command": "backup.sh" },
//!       "without_overlapping_secs": 3600
//!     }
//!   ]
//! }
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use tickrun_core::{
    Condition, ConfigError, ScheduleRule, ScheduleTimezone, TaskDefinition, TaskId,
};
use tickrun_engine::{ExecutorRegistry, ScheduleBuilder};

use crate::error::CliError;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ScheduleFile {
    #[serde(default)]
    conditions: Vec<ConditionSpec>,
    #[serde(default)]
    tasks: Vec<TaskSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Expressions {
    One(String),
    Many(Vec<String>),
}

impl Expressions {
    fn into_vec(self) -> Vec<String> {
        match self {
            Self::One(expression) => vec![expression],
            Self::Many(expressions) => expressions,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TaskSpec {
    id: String,
    kind: String,
    schedule: Expressions,
    timezone: Option<String>,
    #[serde(default)]
    payload: Value,
    description: Option<String>,
    without_overlapping_secs: Option<u64>,
    #[serde(default)]
    run_in_background: bool,
    timeout_secs: Option<u64>,
    #[serde(default)]
    conditions: Vec<ConditionSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
enum ConditionSpec {
    Between {
        start: String,
        end: String,
        timezone: Option<String>,
    },
    UnlessBetween {
        start: String,
        end: String,
        timezone: Option<String>,
    },
    Environment {
        allowed: Vec<String>,
    },
    Skip {
        reason: String,
    },
}

impl ConditionSpec {
    fn into_condition(self, default_timezone: ScheduleTimezone) -> Result<Condition, ConfigError> {
        Ok(match self {
            Self::Between {
                start,
                end,
                timezone,
            } => Condition::between(
                Condition::parse_time(&start)?,
                Condition::parse_time(&end)?,
                timezone_or(timezone.as_deref(), default_timezone)?,
            ),
            Self::UnlessBetween {
                start,
                end,
                timezone,
            } => Condition::unless_between(
                Condition::parse_time(&start)?,
                Condition::parse_time(&end)?,
                timezone_or(timezone.as_deref(), default_timezone)?,
            ),
            Self::Environment { allowed } => {
                if allowed.is_empty() {
                    return Err(ConfigError::InvalidCondition(
                        "environment condition needs at least one name".to_string(),
                    ));
                }
                Condition::environment(allowed)
            }
            Self::Skip { reason } => Condition::skip(reason),
        })
    }
}

impl TaskSpec {
    fn into_definition(self, default_timezone: ScheduleTimezone) -> Result<TaskDefinition, ConfigError> {
        let id = TaskId::new(self.id);
        let timezone = timezone_or(self.timezone.as_deref(), default_timezone)?;
        let expressions = self.schedule.into_vec();
        let rule = ScheduleRule::parse(expressions.as_slice(), timezone, id.as_str())
            .map_err(|source| ConfigError::InvalidRule {
                task_id: id.to_string(),
                source,
            })?;

        let mut task = TaskDefinition::new(id, self.kind, rule).with_payload(self.payload);
        if let Some(description) = self.description {
            task = task.with_description(description);
        }
        if let Some(secs) = self.without_overlapping_secs {
            task = task.without_overlapping(Duration::from_secs(secs));
        }
        if self.run_in_background {
            task = task.in_background();
        }
        if let Some(secs) = self.timeout_secs {
            task = task.with_timeout(Duration::from_secs(secs));
        }
        for condition in self.conditions {
            task = task.with_condition(condition.into_condition(timezone)?);
        }
        Ok(task)
    }
}

fn timezone_or(
    timezone: Option<&str>,
    default_timezone: ScheduleTimezone,
) -> Result<ScheduleTimezone, ConfigError> {
    match timezone {
        Some(tz) => tz
            .parse()
            .map_err(|e| ConfigError::InvalidInput(format!("timezone: {}", e))),
        None => Ok(default_timezone),
    }
}

/// Parse schedule JSON into a builder. `origin` only labels errors.
pub fn parse_schedule(
    source: &str,
    origin: &Path,
    default_timezone: ScheduleTimezone,
    registry: ExecutorRegistry,
) -> Result<ScheduleBuilder, CliError> {
    let file: ScheduleFile = serde_json::from_str(source).map_err(|source| CliError::Parse {
        path: origin.to_path_buf(),
        source,
    })?;

    let mut builder = ScheduleBuilder::new(registry);
    for condition in file.conditions {
        builder = builder.with_condition(condition.into_condition(default_timezone)?);
    }
    for task in file.tasks {
        builder = builder.add_task(task.into_definition(default_timezone)?);
    }
    Ok(builder)
}

/// Read and parse a schedule file.
pub fn load_schedule(
    path: &Path,
    default_timezone: ScheduleTimezone,
    registry: ExecutorRegistry,
) -> Result<ScheduleBuilder, CliError> {
    let source = std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_schedule(&source, path, default_timezone, registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tickrun_core::ConditionKind;

    fn parse(source: &str) -> Result<ScheduleBuilder, CliError> {
        parse_schedule(
            source,
            Path::new("schedule.json"),
            ScheduleTimezone::Utc,
            ExecutorRegistry::with_defaults(),
        )
    }

    #[test]
    fn test_full_task() {
        let schedule = parse(
            r#"{
                "conditions": [{ "type": "environment", "allowed": ["prod"] }],
                "tasks": [{
                    "id": "backup",
                    "kind": "command",
                    "schedule": ["0 3 * * *", "0 15 * * 6"],
                    "timezone": "+02:00",
                    "payload": { "command": "backup.sh" },
                    "description": "Nightly backup",
                    "without_overlapping_secs": 3600,
                    "run_in_background": true,
                    "timeout_secs": 600,
                    "conditions": [
                        { "type": "unless_between", "start": "12:00", "end": "13:00" },
                        { "type": "skip", "reason": "paused" }
                    ]
                }]
            }"#,
        )
        .unwrap()
        .build()
        .unwrap();

        assert_eq!(schedule.conditions().len(), 1);
        let task = &schedule.tasks()[0];
        assert_eq!(task.description, "Nightly backup");
        assert_eq!(task.schedule.expressions().len(), 2);
        assert_eq!(task.without_overlapping, Some(Duration::from_secs(3600)));
        assert_eq!(task.timeout, Some(Duration::from_secs(600)));
        assert!(task.run_in_background);
        assert_eq!(task.conditions.len(), 2);
        assert!(matches!(
            task.conditions[0].kind(),
            ConditionKind::UnlessBetween { .. }
        ));
        // 03:00 at +02:00 is 01:00 UTC.
        assert!(task
            .schedule
            .is_due(Utc.with_ymd_and_hms(2024, 1, 2, 1, 0, 0).unwrap()));
    }

    #[test]
    fn test_minimal_task_defaults() {
        let schedule = parse(
            r#"{ "tasks": [{ "id": "ping", "kind": "ping", "schedule": "hourly",
                 "payload": { "url": "http://localhost/health" } }] }"#,
        )
        .unwrap()
        .build()
        .unwrap();

        let task = &schedule.tasks()[0];
        assert_eq!(task.description, "ping");
        assert!(task.without_overlapping.is_none());
        assert!(!task.run_in_background);
        assert!(task.conditions.is_empty());
    }

    #[test]
    fn test_invalid_rule_names_task() {
        let err = parse(r#"{ "tasks": [{ "id": "bad", "kind": "command", "schedule": "61 * * * *" }] }"#)
            .unwrap_err();
        match err {
            CliError::Config(ConfigError::InvalidRule { task_id, .. }) => assert_eq!(task_id, "bad"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_invalid_condition_time() {
        let err = parse(
            r#"{ "conditions": [{ "type": "between", "start": "9am", "end": "17:00" }] }"#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            CliError::Config(ConfigError::InvalidCondition(_))
        ));
    }

    #[test]
    fn test_malformed_json() {
        let err = parse(r#"{ "tasks": [{ "id": "x" }] }"#).unwrap_err();
        assert!(matches!(err, CliError::Parse { .. }));
    }

    #[test]
    fn test_duplicate_ids_fail_at_build() {
        let builder = parse(
            r#"{ "tasks": [
                { "id": "a", "kind": "command", "schedule": "@daily" },
                { "id": "a", "kind": "command", "schedule": "@hourly" }
            ] }"#,
        )
        .unwrap();
        assert!(matches!(
            builder.build().unwrap_err(),
            ConfigError::DuplicateTask(_)
        ));
    }

    #[test]
    fn test_load_schedule_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("schedule.json");
        std::fs::write(&path, r#"{ "tasks": [] }"#).unwrap();
        let schedule = load_schedule(&path, ScheduleTimezone::Utc, ExecutorRegistry::new())
            .unwrap()
            .build()
            .unwrap();
        assert!(schedule.is_empty());

        assert!(matches!(
            load_schedule(&dir.path().join("nope.json"), ScheduleTimezone::Utc, ExecutorRegistry::new())
                .unwrap_err(),
            CliError::Read { .. }
        ));
    }
}
