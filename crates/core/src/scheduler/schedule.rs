//! Fire-time computation.

use chrono::{DateTime, Utc};
use croner::Cron;
use std::str::FromStr;
use std::time::Duration;

use super::{ScheduleSpec, SchedulerError};

/// A parsed schedule.
pub enum Schedule {
    Interval(Duration),
    Cron { expression: String, cron: Box<Cron> },
}

impl Schedule {
    pub fn from_spec(spec: &ScheduleSpec) -> Result<Self, SchedulerError> {
        match spec {
            ScheduleSpec::Interval { interval_secs: 0 } => Err(SchedulerError::InvalidSchedule(
                "interval_secs must be greater than 0".to_string(),
            )),
            ScheduleSpec::Interval { interval_secs } => {
                Ok(Schedule::Interval(Duration::from_secs(*interval_secs)))
            }
            ScheduleSpec::Cron { cron } => {
                let expression = cron.trim();
                if expression.is_empty() {
                    return Err(SchedulerError::InvalidSchedule(
                        "empty cron expression".to_string(),
                    ));
                }
                let parsed = Cron::from_str(expression).map_err(|e| {
                    SchedulerError::InvalidSchedule(format!("{}: {}", expression, e))
                })?;
                // Reject expressions that never fire.
                parsed
                    .find_next_occurrence(&Utc::now(), false)
                    .map_err(|e| {
                        SchedulerError::InvalidSchedule(format!("{}: {}", expression, e))
                    })?;
                Ok(Schedule::Cron {
                    expression: expression.to_string(),
                    cron: Box::new(parsed),
                })
            }
        }
    }

    /// Next fire strictly after `now`.
    pub fn next_after(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, SchedulerError> {
        match self {
            Schedule::Interval(period) => chrono::Duration::from_std(*period)
                .map(|period| now + period)
                .map_err(|e| SchedulerError::InvalidSchedule(e.to_string())),
            Schedule::Cron { expression, cron } => cron
                .find_next_occurrence(&now, false)
                .map_err(|e| SchedulerError::InvalidSchedule(format!("{}: {}", expression, e))),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Schedule::Interval(period) => format!("every {}s", period.as_secs()),
            Schedule::Cron { expression, .. } => format!("cron {}", expression),
        }
    }
}

impl std::fmt::Debug for Schedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Schedule").field(&self.describe()).finish()
    }
}
