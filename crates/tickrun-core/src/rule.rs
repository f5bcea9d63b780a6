//! Cron-style schedule rules.
//!
//! Supports: "MIN HOUR DOM MON DOW" (5-field, minute resolution)
//! - `*`, `N`, `A-B`, `*/N`, `A-B/N`, `A/N` and comma lists of those
//! - month names (`JAN`-`DEC`) and weekday names (`SUN`-`SAT`), `7` = Sunday
//! - macros: `@yearly`, `@annually`, `@monthly`, `@weekly`, `@daily`,
//!   `@midnight`, `@hourly`, `@every_minute` (the `@` is optional)
//! - hashed fields: `#` or `#(A-B)` resolve to a value derived from the task
//!   id, and `#hourly`, `#daily`, `#weekly`, `#monthly`, `#yearly`,
//!   `#annually`, `#midnight` are the hashed forms of the macros
//!
//! Matching is done on wall-clock fields in the rule's timezone, never on
//! elapsed seconds.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Local, NaiveDateTime, Timelike, Utc,
};
use chrono_tz::Tz;
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::error::RuleError;

/// Maximum look-ahead of [`ScheduleRule::next_due`].
const NEXT_DUE_HORIZON_DAYS: i64 = 5 * 366;

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
    /// Upper bound used for `#` so hashed days exist in every month.
    hash_max: u32,
    names: &'static [&'static str],
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
    hash_max: 59,
    names: &[],
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
    hash_max: 23,
    names: &[],
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
    hash_max: 28,
    names: &[],
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
    hash_max: 12,
    names: &[
        "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
    ],
};
// 7 is accepted as an alias for Sunday and folded to 0 after parsing.
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 7,
    hash_max: 6,
    names: &["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"],
};

/// Set of allowed values for one field, as a bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(self, value: u32) -> bool {
        value < 64 && self.0 & (1u64 << value) != 0
    }

    fn insert(&mut self, value: u32) {
        self.0 |= 1u64 << value;
    }
}

/// One parsed five-field cron expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronExpression {
    source: String,
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronExpression {
    /// Parse an expression. `task_id` seeds hashed (`#`) fields.
    pub fn parse(expression: &str, task_id: &str) -> Result<Self, RuleError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(RuleError::Empty);
        }

        let expanded = expand_macro(trimmed)?;
        let parts: Vec<&str> = expanded.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(RuleError::FieldCount(parts.len()));
        }

        let seed = hash_seed(task_id);
        let mut days_of_week = parse_field(parts[4], DAY_OF_WEEK, seed)?;
        if days_of_week.contains(7) {
            days_of_week.0 &= !(1u64 << 7);
            days_of_week.insert(0);
        }

        Ok(Self {
            source: trimmed.to_string(),
            minutes: parse_field(parts[0], MINUTE, seed)?,
            hours: parse_field(parts[1], HOUR, seed)?,
            days_of_month: parse_field(parts[2], DAY_OF_MONTH, seed)?,
            months: parse_field(parts[3], MONTH, seed)?,
            days_of_week,
            dom_restricted: !is_star(parts[2]),
            dow_restricted: !is_star(parts[4]),
        })
    }

    /// The expression as written (before macro expansion).
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Check wall-clock fields against this expression. Seconds are ignored.
    pub fn matches(&self, wall_clock: &NaiveDateTime) -> bool {
        self.minutes.contains(wall_clock.minute())
            && self.hours.contains(wall_clock.hour())
            && self.matches_day(wall_clock)
    }

    fn matches_day(&self, wall_clock: &NaiveDateTime) -> bool {
        if !self.months.contains(wall_clock.month()) {
            return false;
        }
        let dom = self.days_of_month.contains(wall_clock.day());
        let dow = self
            .days_of_week
            .contains(wall_clock.weekday().num_days_from_sunday());

        // Classic cron: when both day fields are restricted either may match.
        if self.dom_restricted && self.dow_restricted {
            dom || dow
        } else {
            dom && dow
        }
    }
}

impl fmt::Display for CronExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Timezone whose wall clock a rule is evaluated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScheduleTimezone {
    #[default]
    Utc,
    /// The host's local timezone, including its DST rules.
    Local,
    Fixed(FixedOffset),
    /// An IANA zone such as `America/New_York`.
    Named(Tz),
}

impl ScheduleTimezone {
    /// Convert an instant to wall-clock fields in this timezone.
    pub fn wall_clock(&self, instant: DateTime<Utc>) -> NaiveDateTime {
        match self {
            Self::Utc => instant.naive_utc(),
            Self::Local => instant.with_timezone(&Local).naive_local(),
            Self::Fixed(offset) => instant.with_timezone(offset).naive_local(),
            Self::Named(tz) => instant.with_timezone(tz).naive_local(),
        }
    }
}

impl FromStr for ScheduleTimezone {
    type Err = RuleError;

    /// Accepts `UTC`, `Z`, `local`, an IANA name such as `Europe/Paris`, or an
    /// offset such as `+05:30`, `-0800`, `UTC+02:00`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "utc" | "z" | "gmt" => return Ok(Self::Utc),
            "local" => return Ok(Self::Local),
            _ => {}
        }
        if let Ok(tz) = trimmed.parse::<Tz>() {
            return Ok(Self::Named(tz));
        }

        let offset = trimmed
            .strip_prefix("UTC")
            .or_else(|| trimmed.strip_prefix("utc"))
            .unwrap_or(trimmed);
        parse_offset(offset)
            .map(Self::Fixed)
            .ok_or_else(|| RuleError::InvalidTimezone(s.to_string()))
    }
}

impl fmt::Display for ScheduleTimezone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Utc => f.write_str("UTC"),
            Self::Local => f.write_str("local"),
            Self::Fixed(offset) => write!(f, "{}", offset),
            Self::Named(tz) => f.write_str(tz.name()),
        }
    }
}

fn parse_offset(s: &str) -> Option<FixedOffset> {
    let (sign, rest) = match s.chars().next()? {
        '+' => (1, &s[1..]),
        '-' => (-1, &s[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 14 || minutes > 59 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// A task's due-time rule: one or more expressions OR'd together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleRule {
    expressions: Vec<CronExpression>,
    timezone: ScheduleTimezone,
}

impl ScheduleRule {
    /// Parse a set of expressions sharing one timezone.
    pub fn parse<S: AsRef<str>>(
        expressions: &[S],
        timezone: ScheduleTimezone,
        task_id: &str,
    ) -> Result<Self, RuleError> {
        if expressions.is_empty() {
            return Err(RuleError::Empty);
        }
        let expressions = expressions
            .iter()
            .map(|e| CronExpression::parse(e.as_ref(), task_id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            expressions,
            timezone,
        })
    }

    pub fn expressions(&self) -> &[CronExpression] {
        &self.expressions
    }

    pub fn timezone(&self) -> ScheduleTimezone {
        self.timezone
    }

    /// Builder-style: change the timezone.
    pub fn with_timezone(mut self, timezone: ScheduleTimezone) -> Self {
        self.timezone = timezone;
        self
    }

    /// Add another expression, OR'd with the existing ones.
    pub fn push(&mut self, expression: CronExpression) {
        self.expressions.push(expression);
    }

    /// True if any expression matches the wall-clock fields.
    pub fn matches_wall_clock(&self, wall_clock: &NaiveDateTime) -> bool {
        self.expressions.iter().any(|e| e.matches(wall_clock))
    }

    /// True if the rule is due at `instant`.
    pub fn is_due(&self, instant: DateTime<Utc>) -> bool {
        self.matches_wall_clock(&self.timezone.wall_clock(instant))
    }

    /// Next minute strictly after `after` at which the rule is due.
    ///
    /// Walks forward hour by hour until the day and hour fit, then minute by
    /// minute. Gives up after roughly five years (e.g. `0 0 30 2 *`).
    pub fn next_due(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start = after.with_second(0)?.with_nanosecond(0)?;
        let horizon = start + Duration::days(NEXT_DUE_HORIZON_DAYS);
        let mut candidate = start + Duration::minutes(1);

        while candidate <= horizon {
            let wall = self.timezone.wall_clock(candidate);
            let hour_possible = self.expressions.iter().any(|e| {
                e.hours.contains(wall.hour()) && e.matches_day(&wall)
            });
            if !hour_possible {
                candidate += Duration::minutes(i64::from(60 - wall.minute()));
                continue;
            }
            if self.matches_wall_clock(&wall) {
                return Some(candidate);
            }
            candidate += Duration::minutes(1);
        }

        None
    }
}

impl fmt::Display for ScheduleRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined: Vec<&str> = self.expressions.iter().map(|e| e.source()).collect();
        write!(f, "{} ({})", joined.join(" || "), self.timezone)
    }
}

fn expand_macro(expression: &str) -> Result<String, RuleError> {
    let lowered = expression.to_ascii_lowercase();
    if let Some(name) = lowered.strip_prefix('#') {
        // `#` alone or `#(..)` inside a field is handled by the field parser.
        if name.is_empty() || name.starts_with('(') || expression.contains(char::is_whitespace)
        {
            return Ok(expression.to_string());
        }
        let expanded = match name {
            "hourly" => "# * * * *",
            "daily" => "# # * * *",
            "weekly" => "# # * * #",
            "monthly" => "# # # * *",
            "yearly" | "annually" => "# # # # *",
            "midnight" => "# #(0-2) * * *",
            _ => return Err(RuleError::UnknownMacro(expression.to_string())),
        };
        return Ok(expanded.to_string());
    }

    if expression.contains(char::is_whitespace) {
        return Ok(expression.to_string());
    }

    let name = lowered.strip_prefix('@').unwrap_or(&lowered);
    let expanded = match name {
        "yearly" | "annually" => "0 0 1 1 *",
        "monthly" => "0 0 1 * *",
        "weekly" => "0 0 * * 0",
        "daily" | "midnight" => "0 0 * * *",
        "hourly" => "0 * * * *",
        "every_minute" | "minutely" => "* * * * *",
        _ => return Err(RuleError::UnknownMacro(expression.to_string())),
    };
    Ok(expanded.to_string())
}

fn is_star(field: &str) -> bool {
    field.starts_with('*')
}

/// Seed for hashed fields; stable across builds so hashed schedules don't move on upgrade.
fn hash_seed(task_id: &str) -> u64 {
    let digest = Sha256::digest(task_id.as_bytes());
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

fn parse_field(field: &str, spec: FieldSpec, seed: u64) -> Result<FieldSet, RuleError> {
    let mut set = FieldSet(0);
    for part in field.split(',') {
        parse_part(part.trim(), spec, seed, &mut set)?;
    }
    Ok(set)
}

fn parse_part(part: &str, spec: FieldSpec, seed: u64, set: &mut FieldSet) -> Result<(), RuleError> {
    let invalid = || RuleError::InvalidValue {
        field: spec.name,
        value: part.to_string(),
    };
    if part.is_empty() {
        return Err(invalid());
    }

    if let Some(hashed) = part.strip_prefix('#') {
        let (lo, hi) = if hashed.is_empty() {
            (spec.min, spec.hash_max)
        } else {
            let inner = hashed
                .strip_prefix('(')
                .and_then(|s| s.strip_suffix(')'))
                .ok_or_else(invalid)?;
            parse_range(inner, spec, part)?
        };
        let span = u64::from(hi - lo + 1);
        set.insert(lo + (seed % span) as u32);
        return Ok(());
    }

    let (range, step) = match part.split_once('/') {
        Some((range, step)) => {
            let step: u32 = step.parse().map_err(|_| invalid())?;
            if step == 0 {
                return Err(RuleError::InvalidRange {
                    field: spec.name,
                    value: part.to_string(),
                });
            }
            (range, Some(step))
        }
        None => (part, None),
    };

    let (lo, hi) = if range == "*" || range == "?" {
        (spec.min, spec.max)
    } else if range.contains('-') {
        parse_range(range, spec, part)?
    } else {
        let value = parse_value(range, spec)?;
        // `A/N` means from A to the end of the field.
        match step {
            Some(_) => (value, spec.max),
            None => (value, value),
        }
    };

    let step = step.unwrap_or(1) as usize;
    for value in (lo..=hi).step_by(step) {
        set.insert(value);
    }
    Ok(())
}

fn parse_range(range: &str, spec: FieldSpec, part: &str) -> Result<(u32, u32), RuleError> {
    let (lo, hi) = range.split_once('-').ok_or_else(|| RuleError::InvalidValue {
        field: spec.name,
        value: part.to_string(),
    })?;
    let lo = parse_value(lo, spec)?;
    let hi = parse_value(hi, spec)?;
    if lo > hi {
        return Err(RuleError::InvalidRange {
            field: spec.name,
            value: part.to_string(),
        });
    }
    Ok((lo, hi))
}

fn parse_value(token: &str, spec: FieldSpec) -> Result<u32, RuleError> {
    let upper = token.trim().to_ascii_uppercase();
    let name_base = if spec.name == MONTH.name { 1 } else { 0 };
    if let Some(index) = spec.names.iter().position(|n| *n == upper) {
        return Ok(index as u32 + name_base);
    }

    let value: u32 = upper.parse().map_err(|_| RuleError::InvalidValue {
        field: spec.name,
        value: token.to_string(),
    })?;
    if value < spec.min || value > spec.max {
        return Err(RuleError::OutOfRange {
            field: spec.name,
            value,
            min: spec.min,
            max: spec.max,
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    fn wall(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, 0)
            .unwrap()
    }

    fn expr(s: &str) -> CronExpression {
        CronExpression::parse(s, "task").unwrap()
    }

    #[test]
    fn test_every_minute_and_midnight() {
        let every = expr("* * * * *");
        let midnight = expr("0 0 * * *");
        assert!(every.matches(&wall(2023, 1, 1, 0, 0)));
        assert!(midnight.matches(&wall(2023, 1, 1, 0, 0)));
        assert!(every.matches(&wall(2023, 1, 1, 0, 1)));
        assert!(!midnight.matches(&wall(2023, 1, 1, 0, 1)));
    }

    #[test]
    fn test_steps_ranges_and_lists() {
        let e = expr("*/15 9-17 * * 1-5");
        assert!(e.matches(&wall(2024, 3, 4, 9, 45))); // Monday
        assert!(!e.matches(&wall(2024, 3, 4, 9, 50)));
        assert!(!e.matches(&wall(2024, 3, 4, 18, 0)));
        assert!(!e.matches(&wall(2024, 3, 3, 10, 0))); // Sunday

        let e = expr("0,30 8-20/4 * * *");
        assert!(e.matches(&wall(2024, 3, 4, 12, 30)));
        assert!(!e.matches(&wall(2024, 3, 4, 10, 30)));

        let e = expr("5/20 * * * *");
        assert!(e.matches(&wall(2024, 3, 4, 1, 45)));
        assert!(!e.matches(&wall(2024, 3, 4, 1, 0)));
    }

    #[test]
    fn test_names_and_sunday_alias() {
        let e = expr("0 12 * JAN-MAR sun");
        assert!(e.matches(&wall(2024, 2, 4, 12, 0))); // Sunday in Feb
        assert!(!e.matches(&wall(2024, 4, 7, 12, 0))); // Sunday in Apr

        let seven = expr("0 12 * * 7");
        assert!(seven.matches(&wall(2024, 2, 4, 12, 0)));
    }

    #[test]
    fn test_day_fields_are_ored_when_both_restricted() {
        // The 13th of the month, or any Friday.
        let e = expr("0 0 13 * 5");
        assert!(e.matches(&wall(2024, 3, 13, 0, 0))); // Wednesday the 13th
        assert!(e.matches(&wall(2024, 3, 15, 0, 0))); // Friday the 15th
        assert!(!e.matches(&wall(2024, 3, 14, 0, 0)));

        // Only DOM restricted: weekday is irrelevant.
        let e = expr("0 0 13 * *");
        assert!(!e.matches(&wall(2024, 3, 15, 0, 0)));
    }

    #[test]
    fn test_leap_day() {
        let e = expr("0 0 29 2 *");
        assert!(e.matches(&wall(2024, 2, 29, 0, 0)));
        let rule = ScheduleRule::parse(&["0 0 29 2 *"], ScheduleTimezone::Utc, "t").unwrap();
        let after = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let next = rule.next_due(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2028, 2, 29, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_macros_expand() {
        assert_eq!(expr("@hourly"), CronExpression { source: "@hourly".into(), ..expr("0 * * * *") });
        assert!(expr("daily").matches(&wall(2024, 5, 5, 0, 0)));
        assert!(expr("@weekly").matches(&wall(2024, 5, 5, 0, 0))); // Sunday
        assert!(expr("@yearly").matches(&wall(2025, 1, 1, 0, 0)));
        assert!(!expr("@monthly").matches(&wall(2025, 1, 2, 0, 0)));
        assert!(expr("@every_minute").matches(&wall(2025, 1, 2, 3, 4)));
        assert!(matches!(
            CronExpression::parse("@fortnightly", "t"),
            Err(RuleError::UnknownMacro(_))
        ));
    }

    #[test]
    fn test_hashed_fields_are_deterministic_per_task() {
        let a1 = CronExpression::parse("#daily", "report").unwrap();
        let a2 = CronExpression::parse("#daily", "report").unwrap();
        assert_eq!(a1, a2);

        let matching: Vec<_> = (0..24)
            .flat_map(|h| (0..60).map(move |m| (h, m)))
            .filter(|(h, m)| a1.matches(&wall(2024, 1, 1, *h, *m)))
            .collect();
        assert_eq!(matching.len(), 1);

        let midnight = CronExpression::parse("#midnight", "report").unwrap();
        let hours: Vec<u32> = (0..24)
            .filter(|h| (0..60).any(|m| midnight.matches(&wall(2024, 1, 1, *h, m))))
            .collect();
        assert_eq!(hours.len(), 1);
        assert!(hours[0] <= 2);
    }

    #[test]
    fn test_invalid_expressions() {
        assert_eq!(CronExpression::parse("", "t"), Err(RuleError::Empty));
        assert_eq!(
            CronExpression::parse("* * * *", "t"),
            Err(RuleError::FieldCount(4))
        );
        assert!(matches!(
            CronExpression::parse("60 * * * *", "t"),
            Err(RuleError::OutOfRange { field: "minute", .. })
        ));
        assert!(matches!(
            CronExpression::parse("*/0 * * * *", "t"),
            Err(RuleError::InvalidRange { .. })
        ));
        assert!(matches!(
            CronExpression::parse("5-1 * * * *", "t"),
            Err(RuleError::InvalidRange { .. })
        ));
        assert!(matches!(
            CronExpression::parse("a * * * *", "t"),
            Err(RuleError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_rule_ors_expressions() {
        let rule =
            ScheduleRule::parse(&["0 9 * * *", "30 17 * * *"], ScheduleTimezone::Utc, "t").unwrap();
        assert!(rule.is_due(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()));
        assert!(rule.is_due(Utc.with_ymd_and_hms(2024, 1, 1, 17, 30, 0).unwrap()));
        assert!(!rule.is_due(Utc.with_ymd_and_hms(2024, 1, 1, 9, 30, 0).unwrap()));
        assert!(ScheduleRule::parse::<&str>(&[], ScheduleTimezone::Utc, "t").is_err());
    }

    #[test]
    fn test_fixed_offset_uses_wall_clock() {
        let tz: ScheduleTimezone = "+05:30".parse().unwrap();
        let rule = ScheduleRule::parse(&["0 9 * * *"], tz, "t").unwrap();
        // 03:30 UTC is 09:00 in +05:30.
        assert!(rule.is_due(Utc.with_ymd_and_hms(2024, 1, 1, 3, 30, 0).unwrap()));
        assert!(!rule.is_due(Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap()));
    }

    #[test]
    fn test_timezone_parsing() {
        assert_eq!("UTC".parse::<ScheduleTimezone>().unwrap(), ScheduleTimezone::Utc);
        assert_eq!("local".parse::<ScheduleTimezone>().unwrap(), ScheduleTimezone::Local);
        assert_eq!(
            "UTC-0800".parse::<ScheduleTimezone>().unwrap(),
            ScheduleTimezone::Fixed(FixedOffset::west_opt(8 * 3600).unwrap())
        );
        assert!("Mars/Olympus".parse::<ScheduleTimezone>().is_err());
    }

    fn new_york() -> ScheduleTimezone {
        "America/New_York".parse().unwrap()
    }

    #[test]
    fn test_named_timezone_parsing() {
        assert_eq!(
            new_york(),
            ScheduleTimezone::Named(chrono_tz::America::New_York)
        );
        assert_eq!(new_york().to_string(), "America/New_York");
        assert!("Europe/Atlantis".parse::<ScheduleTimezone>().is_err());
    }

    #[test]
    fn test_spring_forward_skips_missing_minute() {
        // 2024-03-10 in New York: 01:59 EST (06:59 UTC) is followed by
        // 03:00 EDT (07:00 UTC). 02:30 never happens on the wall clock.
        let rule = ScheduleRule::parse(&["30 2 * * *"], new_york(), "t").unwrap();
        let mut instant = Utc.with_ymd_and_hms(2024, 3, 10, 5, 0, 0).unwrap();
        while instant < Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap() {
            assert!(!rule.is_due(instant), "due at {instant}");
            instant += Duration::minutes(1);
        }
        // The day before, 02:30 EST is 07:30 UTC.
        assert!(rule.is_due(Utc.with_ymd_and_hms(2024, 3, 9, 7, 30, 0).unwrap()));

        // Rules on either side of the gap use the new offset immediately.
        let three = ScheduleRule::parse(&["0 3 * * *"], new_york(), "t").unwrap();
        assert!(three.is_due(Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap()));
        assert_eq!(
            three.next_due(Utc.with_ymd_and_hms(2024, 3, 10, 6, 0, 0).unwrap()),
            Some(Utc.with_ymd_and_hms(2024, 3, 10, 7, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_fall_back_repeats_minute() {
        // 2024-11-03 in New York: 01:30 happens at 05:30 UTC (EDT) and again
        // at 06:30 UTC (EST).
        let rule = ScheduleRule::parse(&["30 1 * * *"], new_york(), "t").unwrap();
        let first = Utc.with_ymd_and_hms(2024, 11, 3, 5, 30, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 11, 3, 6, 30, 0).unwrap();
        assert!(rule.is_due(first));
        assert!(rule.is_due(second));
        assert!(!rule.is_due(Utc.with_ymd_and_hms(2024, 11, 3, 7, 30, 0).unwrap()));
        assert_eq!(
            rule.next_due(Utc.with_ymd_and_hms(2024, 11, 3, 5, 0, 0).unwrap()),
            Some(first)
        );
        assert_eq!(rule.next_due(first), Some(second));

        // A daily 09:00 rule follows the wall clock, so its UTC instant moves
        // by an hour across the change.
        let nine = ScheduleRule::parse(&["0 9 * * *"], new_york(), "t").unwrap();
        assert!(nine.is_due(Utc.with_ymd_and_hms(2024, 11, 2, 13, 0, 0).unwrap()));
        assert!(nine.is_due(Utc.with_ymd_and_hms(2024, 11, 4, 14, 0, 0).unwrap()));
        assert!(!nine.is_due(Utc.with_ymd_and_hms(2024, 11, 4, 13, 0, 0).unwrap()));
    }

    #[test]
    fn test_next_due() {
        let rule = ScheduleRule::parse(&["0 8 * * *"], ScheduleTimezone::Utc, "t").unwrap();
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 7, 0, 30).unwrap();
        assert_eq!(
            rule.next_due(after),
            Some(Utc.with_ymd_and_hms(2026, 2, 22, 8, 0, 0).unwrap())
        );

        let after = Utc.with_ymd_and_hms(2026, 2, 22, 8, 0, 0).unwrap();
        assert_eq!(
            rule.next_due(after),
            Some(Utc.with_ymd_and_hms(2026, 2, 23, 8, 0, 0).unwrap())
        );

        let never = ScheduleRule::parse(&["0 0 30 2 *"], ScheduleTimezone::Utc, "t").unwrap();
        assert_eq!(never.next_due(after), None);
    }
}
