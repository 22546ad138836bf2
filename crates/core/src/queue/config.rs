//! Executor configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the task queue and worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Number of worker slots. 1 runs tasks strictly one at a time.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Wall-clock budget for one scrape run (seconds).
    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,

    /// Identities that succeeded within this window are skipped unless the
    /// submission is forced. Unset disables suppression.
    #[serde(default)]
    pub recency_window_secs: Option<u64>,

    /// How often a halted pool re-checks resources (seconds).
    #[serde(default = "default_recovery_interval")]
    pub recovery_check_interval_secs: u64,

    /// Lines retained per task log.
    #[serde(default = "default_log_line_limit")]
    pub log_line_limit: usize,

    /// Directory probed by the recovery check. Unset means the check always
    /// passes.
    #[serde(default)]
    pub output_root: Option<PathBuf>,

    /// How long shutdown waits for running tasks (seconds).
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

fn default_workers() -> usize {
    1
}

fn default_task_timeout() -> u64 {
    3600
}

fn default_recovery_interval() -> u64 {
    30
}

fn default_log_line_limit() -> usize {
    2000
}

fn default_shutdown_grace() -> u64 {
    30
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            task_timeout_secs: default_task_timeout(),
            recency_window_secs: None,
            recovery_check_interval_secs: default_recovery_interval(),
            log_line_limit: default_log_line_limit(),
            output_root: None,
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}
