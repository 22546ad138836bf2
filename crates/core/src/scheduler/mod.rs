//! Scheduled sweeps.
//!
//! The [`SweepScheduler`] enumerates its root on an interval or calendar
//! schedule and submits every eligible file with origin `schedule`. It is
//! the fallback coverage for missed watcher notifications.

mod config;
mod schedule;
mod sweeper;

pub use config::{ScheduleSpec, SchedulerConfig};
pub use schedule::Schedule;
pub use sweeper::{SweepReport, SweepScheduler, SweepTrigger};

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("a sweep is already in progress")]
    SweepInProgress,

    #[error("sweep root is not available: {}", .0.display())]
    RootUnavailable(PathBuf),

    #[error("scan failed: {0}")]
    Scan(String),
}
