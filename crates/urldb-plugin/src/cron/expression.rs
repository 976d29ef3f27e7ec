//! Cron expressions (5 fields, or 6 with a leading seconds field).

use std::sync::Arc;

use chrono::{DateTime, Utc};
use croner::Cron;

/// A parsed, validated cron schedule.
#[derive(Clone)]
pub struct CronSchedule {
    expression: String,
    with_seconds: bool,
    cron: Arc<Cron>,
}

impl CronSchedule {
    /// Parses a 5- or 6-field expression. `@hourly` style aliases are accepted.
    pub fn parse(expression: &str) -> Result<Self, String> {
        let expression = expression.trim();
        let fields = expression.split_whitespace().count();
        let alias = expression.starts_with('@');
        if !alias && !(fields == 5 || fields == 6) {
            return Err(format!("expected 5 or 6 fields, found {fields}"));
        }

        let cron = Cron::new(expression)
            .with_seconds_optional()
            .parse()
            .map_err(|e| e.to_string())?;

        Ok(Self {
            expression: expression.to_string(),
            with_seconds: fields == 6,
            cron: Arc::new(cron),
        })
    }

    /// The expression as written.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Whether the expression carries a seconds field.
    pub fn has_seconds(&self) -> bool {
        self.with_seconds
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cron.find_next_occurrence(&after, false).ok()
    }
}

impl std::fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CronSchedule").field(&self.expression).finish()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn test_five_field_every_five_minutes() {
        let schedule = CronSchedule::parse("*/5 * * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 2, 30).unwrap();
        let next = schedule.next_after(start).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 1, 1, 10, 5, 0).unwrap());
        assert!(!schedule.has_seconds());
    }

    #[test]
    fn test_six_field_with_seconds() {
        let schedule = CronSchedule::parse("*/10 * * * * *").unwrap();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 1).unwrap();
        assert_eq!(
            schedule.next_after(start).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 10).unwrap()
        );
        assert!(schedule.has_seconds());
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(CronSchedule::parse("every five minutes").is_err());
        assert!(CronSchedule::parse("* * *").is_err());
        assert!(CronSchedule::parse("61 * * * *").is_err());
    }
}
