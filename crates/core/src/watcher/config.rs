//! Watcher configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the directory watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Directory observed recursively.
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// A file is ready once its size is unchanged for this long
    /// (milliseconds). Also the period of the stability check.
    #[serde(default = "default_stability_interval")]
    pub stability_interval_ms: u64,

    /// Capacity of the change-event channel.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Rule preset for watched submissions.
    #[serde(default)]
    pub preset: Option<String>,

    #[serde(default)]
    pub backoff: BackoffConfig,
}

fn default_stability_interval() -> u64 {
    5000
}

fn default_event_buffer() -> usize {
    1024
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: None,
            stability_interval_ms: default_stability_interval(),
            event_buffer: default_event_buffer(),
            preset: None,
            backoff: BackoffConfig::default(),
        }
    }
}

/// Retry schedule for watcher backend failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    #[serde(default = "default_initial_ms")]
    pub initial_ms: u64,
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_initial_ms() -> u64 {
    1000
}

fn default_max_ms() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial_ms: default_initial_ms(),
            max_ms: default_max_ms(),
            multiplier: default_multiplier(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: WatcherConfig = toml::from_str("").unwrap();
        assert!(!config.enabled);
        assert_eq!(config.stability_interval_ms, 5000);
        assert_eq!(config.event_buffer, 1024);
        assert_eq!(config.backoff.max_ms, 60_000);
    }

    #[test]
    fn test_partial_backoff() {
        let config: WatcherConfig = toml::from_str(
            r#"
enabled = true
root = "/srv/inbox"

[backoff]
initial_ms = 250
"#,
        )
        .unwrap();
        assert_eq!(config.root, Some(PathBuf::from("/srv/inbox")));
        assert_eq!(config.backoff.initial_ms, 250);
        assert_eq!(config.backoff.multiplier, 2.0);
    }
}
