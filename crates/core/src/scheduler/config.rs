//! Scheduler configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// When sweeps fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScheduleSpec {
    /// Fixed period in seconds.
    Interval { interval_secs: u64 },
    /// Calendar expression (5 or 6 fields, or `@daily` style aliases).
    Cron { cron: String },
}

impl Default for ScheduleSpec {
    fn default() -> Self {
        ScheduleSpec::Interval {
            interval_secs: 3600,
        }
    }
}

/// Configuration for scheduled sweeps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Directory swept. Falls back to the watcher root.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Rule preset for scheduled submissions.
    #[serde(default)]
    pub preset: Option<String>,

    #[serde(default)]
    pub schedule: ScheduleSpec,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_hourly_interval() {
        let config: SchedulerConfig = toml::from_str("enabled = true").unwrap();
        assert!(config.enabled);
        assert_eq!(
            config.schedule,
            ScheduleSpec::Interval {
                interval_secs: 3600
            }
        );
    }

    #[test]
    fn test_schedule_forms() {
        let config: SchedulerConfig =
            toml::from_str("schedule = { interval_secs = 900 }").unwrap();
        assert_eq!(
            config.schedule,
            ScheduleSpec::Interval { interval_secs: 900 }
        );

        let config: SchedulerConfig = toml::from_str("schedule = { cron = \"@daily\" }").unwrap();
        assert_eq!(
            config.schedule,
            ScheduleSpec::Cron {
                cron: "@daily".into()
            }
        );
    }
}
