//! Due-time evaluation: which definitions are due at a reference time.

use chrono::{DateTime, Utc};
use std::borrow::Borrow;

use crate::TaskDefinition;

/// Pure selection of due tasks.
///
/// Rules are parsed when definitions are built, so evaluation cannot fail.
#[derive(Debug, Clone, Copy, Default)]
pub struct DueTimeEvaluator;

impl DueTimeEvaluator {
    /// Definitions whose rule matches `reference_time`, in definition order.
    ///
    /// Works over anything that borrows as a definition (`&TaskDefinition`,
    /// `Arc<TaskDefinition>`), handing back the same items.
    pub fn evaluate<I, T>(definitions: I, reference_time: DateTime<Utc>) -> Vec<T>
    where
        I: IntoIterator<Item = T>,
        T: Borrow<TaskDefinition>,
    {
        definitions
            .into_iter()
            .filter(|d| d.borrow().schedule.is_due(reference_time))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ScheduleTimezone, TaskKind};
    use chrono::TimeZone;

    fn ids(due: &[&TaskDefinition]) -> Vec<String> {
        due.iter().map(|d| d.id.to_string()).collect()
    }

    #[test]
    fn test_every_minute_vs_midnight() {
        let defs = vec![
            TaskDefinition::cron("A", TaskKind::COMMAND, "* * * * *").unwrap(),
            TaskDefinition::cron("B", TaskKind::COMMAND, "0 0 * * *").unwrap(),
        ];

        let midnight = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(ids(&DueTimeEvaluator::evaluate(&defs, midnight)), ["A", "B"]);

        let one_past = Utc.with_ymd_and_hms(2023, 1, 1, 0, 1, 0).unwrap();
        assert_eq!(ids(&DueTimeEvaluator::evaluate(&defs, one_past)), ["A"]);
    }

    #[test]
    fn test_seconds_are_ignored() {
        let defs = vec![TaskDefinition::cron("B", TaskKind::COMMAND, "0 0 * * *").unwrap()];
        let t = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 59).unwrap();
        assert_eq!(DueTimeEvaluator::evaluate(&defs, t).len(), 1);
    }

    #[test]
    fn test_preserves_definition_order() {
        let defs = vec![
            TaskDefinition::cron("z", TaskKind::COMMAND, "@every_minute").unwrap(),
            TaskDefinition::cron("a", TaskKind::COMMAND, "@every_minute").unwrap(),
            TaskDefinition::cron("m", TaskKind::COMMAND, "@every_minute").unwrap(),
        ];
        let t = Utc.with_ymd_and_hms(2023, 6, 1, 12, 34, 0).unwrap();
        assert_eq!(ids(&DueTimeEvaluator::evaluate(&defs, t)), ["z", "a", "m"]);
    }

    #[test]
    fn test_month_end_and_timezone() {
        let defs = vec![
            TaskDefinition::cron("month-start", TaskKind::COMMAND, "@monthly").unwrap(),
            TaskDefinition::cron("tokyo-nine", TaskKind::COMMAND, "0 9 * * *")
                .unwrap()
                .with_timezone("+09:00".parse::<ScheduleTimezone>().unwrap()),
        ];
        // 2024-03-01 00:00 UTC is 09:00 in +09:00.
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(
            ids(&DueTimeEvaluator::evaluate(&defs, t)),
            ["month-start", "tokyo-nine"]
        );
        let t = Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap();
        assert_eq!(ids(&DueTimeEvaluator::evaluate(&defs, t)), ["tokyo-nine"]);
    }
}
