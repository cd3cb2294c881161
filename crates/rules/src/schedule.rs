//! Rule schedules and next-run computation.

use chrono::{DateTime, Datelike, Duration, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

use stockpilot_core::{DomainError, DomainResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleFrequency {
    /// Evaluated on every sweep and on matching domain events.
    Realtime,
    Hourly,
    Daily,
    Weekly,
}

/// When a rule becomes due.
///
/// `time` is `"HH:MM"` UTC. For hourly schedules only the minute is used. `days`
/// restricts any frequency to the listed weekdays; weekly schedules require at least one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub frequency: ScheduleFrequency,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(default)]
    pub days: Vec<Weekday>,
}

impl Schedule {
    pub fn realtime() -> Self {
        Self {
            frequency: ScheduleFrequency::Realtime,
            time: None,
            days: Vec::new(),
        }
    }

    pub fn daily_at(time: &str) -> Self {
        Self {
            frequency: ScheduleFrequency::Daily,
            time: Some(time.to_string()),
            days: Vec::new(),
        }
    }

    pub fn is_realtime(&self) -> bool {
        self.frequency == ScheduleFrequency::Realtime
    }

    pub fn validate(&self) -> DomainResult<()> {
        self.time_of_day()?;
        if self.frequency == ScheduleFrequency::Weekly && self.days.is_empty() {
            return Err(DomainError::validation(
                "weekly schedule needs at least one day",
            ));
        }
        Ok(())
    }

    fn time_of_day(&self) -> DomainResult<NaiveTime> {
        match &self.time {
            None => Ok(NaiveTime::MIN),
            Some(raw) => NaiveTime::parse_from_str(raw, "%H:%M").map_err(|_| {
                DomainError::validation(format!("invalid schedule time '{raw}' (expected HH:MM)"))
            }),
        }
    }

    fn day_allowed(&self, at: DateTime<Utc>) -> bool {
        self.days.is_empty() || self.days.contains(&at.weekday())
    }

    /// First slot strictly after `after`, or `None` for realtime schedules.
    ///
    /// An unparsable time falls back to midnight; definitions are validated on write.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let time = self.time_of_day().unwrap_or(NaiveTime::MIN);

        match self.frequency {
            ScheduleFrequency::Realtime => None,
            ScheduleFrequency::Hourly => {
                let mut slot = after
                    .with_minute(time.minute())
                    .and_then(|t| t.with_second(0))
                    .and_then(|t| t.with_nanosecond(0))?;
                if slot <= after {
                    slot += Duration::hours(1);
                }
                // A week of hours covers any weekday restriction.
                (0..24 * 7)
                    .map(|h| slot + Duration::hours(h))
                    .find(|s| self.day_allowed(*s))
            }
            ScheduleFrequency::Daily | ScheduleFrequency::Weekly => {
                let start = after.date_naive();
                (0..=7)
                    .filter_map(|d| start.checked_add_signed(Duration::days(d)))
                    .map(|date| date.and_time(time).and_utc())
                    .find(|slot| *slot > after && self.day_allowed(*slot))
            }
        }
    }
}
