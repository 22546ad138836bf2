//! Directory watching.
//!
//! The [`DirectoryWatcher`] turns filesystem notifications into `watch`
//! submissions once files stop growing. [`ScanFilter`] holds the file
//! selection rules it shares with the scheduler.

mod backoff;
mod config;
mod filter;
mod stability;
#[allow(clippy::module_inception)]
mod watcher;

pub use backoff::BackoffPolicy;
pub use config::{BackoffConfig, WatcherConfig};
pub use filter::ScanFilter;
pub use stability::StabilityTracker;
pub use watcher::{translate, ChangeEvent, DirectoryWatcher, WatcherSnapshot, WatcherStatus};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("watcher root is not configured")]
    MissingRoot,

    #[error("watcher backend error: {0}")]
    Backend(String),

    #[error("invalid scan filter: {0}")]
    Filter(String),
}
