//! Named boolean predicates gating a whole run or a single task.

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use std::fmt;
use std::sync::Arc;

use crate::error::ConfigError;
use crate::rule::ScheduleTimezone;

/// Inputs a condition may look at.
#[derive(Debug, Clone, Copy)]
pub struct ConditionContext<'a> {
    /// Reference time of the tick.
    pub now: DateTime<Utc>,
    /// Environment name the schedule runs in (e.g. "prod").
    pub environment: Option<&'a str>,
}

impl<'a> ConditionContext<'a> {
    pub fn new(now: DateTime<Utc>, environment: Option<&'a str>) -> Self {
        Self { now, environment }
    }
}

/// Predicate variants.
#[derive(Clone)]
pub enum ConditionKind {
    /// True inside the inclusive window; wraps past midnight when `start > end`.
    Between {
        start: NaiveTime,
        end: NaiveTime,
        timezone: ScheduleTimezone,
    },
    /// True outside the window.
    UnlessBetween {
        start: NaiveTime,
        end: NaiveTime,
        timezone: ScheduleTimezone,
    },
    /// True iff the configured environment is one of `allowed`.
    Environment { allowed: Vec<String> },
    /// Always false.
    Skip,
    /// Arbitrary predicate.
    Custom(Arc<dyn Fn() -> bool + Send + Sync>),
}

impl fmt::Debug for ConditionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Between { start, end, timezone } => f
                .debug_struct("Between")
                .field("start", start)
                .field("end", end)
                .field("timezone", timezone)
                .finish(),
            Self::UnlessBetween { start, end, timezone } => f
                .debug_struct("UnlessBetween")
                .field("start", start)
                .field("end", end)
                .field("timezone", timezone)
                .finish(),
            Self::Environment { allowed } => f
                .debug_struct("Environment")
                .field("allowed", allowed)
                .finish(),
            Self::Skip => f.write_str("Skip"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// A condition and the description reported when it evaluates false.
#[derive(Debug, Clone)]
pub struct Condition {
    description: String,
    kind: ConditionKind,
}

impl Condition {
    /// Create a condition with an explicit description.
    pub fn new(description: impl Into<String>, kind: ConditionKind) -> Self {
        Self {
            description: description.into(),
            kind,
        }
    }

    /// Only run inside the `start..=end` time-of-day window.
    pub fn between(start: NaiveTime, end: NaiveTime, timezone: ScheduleTimezone) -> Self {
        Self::new(
            format!(
                "Only runs between {} and {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            ),
            ConditionKind::Between {
                start,
                end,
                timezone,
            },
        )
    }

    /// Only run outside the `start..=end` time-of-day window.
    pub fn unless_between(start: NaiveTime, end: NaiveTime, timezone: ScheduleTimezone) -> Self {
        Self::new(
            format!(
                "Only runs if not between {} and {}",
                start.format("%H:%M"),
                end.format("%H:%M")
            ),
            ConditionKind::UnlessBetween {
                start,
                end,
                timezone,
            },
        )
    }

    /// Only run in one of the given environments.
    pub fn environment<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let allowed: Vec<String> = allowed.into_iter().map(Into::into).collect();
        Self::new(
            format!("Runs only in [{}] environment", allowed.join(", ")),
            ConditionKind::Environment { allowed },
        )
    }

    /// Always skip, reporting `reason`.
    pub fn skip(reason: impl Into<String>) -> Self {
        Self::new(reason, ConditionKind::Skip)
    }

    /// Run only when `predicate` returns true; otherwise skip with `description`.
    pub fn when<F>(description: impl Into<String>, predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Self::new(description, ConditionKind::Custom(Arc::new(predicate)))
    }

    /// Parse an "HH:MM" time of day.
    pub fn parse_time(s: &str) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(s.trim(), "%H:%M")
            .map_err(|e| ConfigError::InvalidCondition(format!("bad time '{}': {}", s, e)))
    }

    pub fn kind(&self) -> &ConditionKind {
        &self.kind
    }

    /// Description reported when the condition is false.
    pub fn describe(&self) -> &str {
        &self.description
    }

    /// Evaluate the predicate.
    pub fn evaluate(&self, ctx: &ConditionContext<'_>) -> bool {
        match &self.kind {
            ConditionKind::Between {
                start,
                end,
                timezone,
            } => in_window(ctx.now, *start, *end, *timezone),
            ConditionKind::UnlessBetween {
                start,
                end,
                timezone,
            } => !in_window(ctx.now, *start, *end, *timezone),
            ConditionKind::Environment { allowed } => ctx
                .environment
                .is_some_and(|env| allowed.iter().any(|a| a == env)),
            ConditionKind::Skip => false,
            ConditionKind::Custom(predicate) => predicate(),
        }
    }
}

fn in_window(
    now: DateTime<Utc>,
    start: NaiveTime,
    end: NaiveTime,
    timezone: ScheduleTimezone,
) -> bool {
    // Minute resolution, like the schedule rules.
    let wall = timezone.wall_clock(now).time();
    let minute_of_day = |t: NaiveTime| t.hour() * 60 + t.minute();
    let (now, start, end) = (
        minute_of_day(wall),
        minute_of_day(start),
        minute_of_day(end),
    );

    if start <= end {
        start <= now && now <= end
    } else {
        now >= start || now <= end
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, h, m, 0).unwrap()
    }

    fn t(s: &str) -> NaiveTime {
        Condition::parse_time(s).unwrap()
    }

    #[test]
    fn test_between_inclusive() {
        let c = Condition::between(t("09:00"), t("17:00"), ScheduleTimezone::Utc);
        assert!(c.evaluate(&ConditionContext::new(at(9, 0), None)));
        assert!(c.evaluate(&ConditionContext::new(at(17, 0), None)));
        assert!(!c.evaluate(&ConditionContext::new(at(17, 1), None)));
        assert_eq!(c.describe(), "Only runs between 09:00 and 17:00");
    }

    #[test]
    fn test_between_wraps_midnight() {
        let c = Condition::between(t("22:00"), t("02:00"), ScheduleTimezone::Utc);
        assert!(c.evaluate(&ConditionContext::new(at(23, 30), None)));
        assert!(c.evaluate(&ConditionContext::new(at(1, 0), None)));
        assert!(!c.evaluate(&ConditionContext::new(at(12, 0), None)));
    }

    #[test]
    fn test_unless_between() {
        let c = Condition::unless_between(t("00:00"), t("06:00"), ScheduleTimezone::Utc);
        assert!(!c.evaluate(&ConditionContext::new(at(3, 0), None)));
        assert!(c.evaluate(&ConditionContext::new(at(7, 0), None)));
    }

    #[test]
    fn test_environment() {
        let c = Condition::environment(["prod", "staging"]);
        assert!(c.evaluate(&ConditionContext::new(at(0, 0), Some("prod"))));
        assert!(!c.evaluate(&ConditionContext::new(at(0, 0), Some("dev"))));
        assert!(!c.evaluate(&ConditionContext::new(at(0, 0), None)));
    }

    #[test]
    fn test_skip_and_custom() {
        let ctx = ConditionContext::new(at(0, 0), None);
        let skip = Condition::skip("maintenance window");
        assert!(!skip.evaluate(&ctx));
        assert_eq!(skip.describe(), "maintenance window");

        let custom = Condition::when("feature flag off", || true);
        assert!(custom.evaluate(&ctx));
    }

    #[test]
    fn test_parse_time_rejects_garbage() {
        assert!(Condition::parse_time("25:00").is_err());
        assert!(Condition::parse_time("noon").is_err());
    }
}
