use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::queue::ExecutorConfig;
use crate::scheduler::SchedulerConfig;
use crate::scrape::ScrapeConfig;
use crate::watcher::WatcherConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub rules: RulesConfig,
    #[serde(default)]
    pub executor: ExecutorConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub watcher: WatcherConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub scrape: ScrapeConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Database configuration. Holds history, task logs and the queue journal.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("curator.db")
}

/// Location of the global scrape rules and the named presets.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RulesConfig {
    /// JSON document holding the global rule set.
    #[serde(default = "default_global_path")]
    pub global_path: PathBuf,
    /// JSON document mapping preset names to partial overlays.
    #[serde(default = "default_presets_path")]
    pub presets_path: PathBuf,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            global_path: default_global_path(),
            presets_path: default_presets_path(),
        }
    }
}

fn default_global_path() -> PathBuf {
    PathBuf::from("data/config.json")
}

fn default_presets_path() -> PathBuf {
    PathBuf::from("data/presets.json")
}

/// File selection rules shared by the watcher, the scheduler and
/// manual directory submissions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanConfig {
    /// Accepted media extensions. Entries may carry a leading dot and may
    /// be `;`-separated lists.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    /// Files must be strictly larger than this to be picked up.
    #[serde(default)]
    pub minimum_size_bytes: u64,
    /// Regular expressions matched against folder names; matching folders
    /// are never descended into.
    #[serde(default = "default_ignored_folders")]
    pub ignored_folder_patterns: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            extensions: default_extensions(),
            minimum_size_bytes: 0,
            ignored_folder_patterns: default_ignored_folders(),
        }
    }
}

fn default_extensions() -> Vec<String> {
    ["3gp", "avi", "f4v", "flv", "iso", "m2ts", "m4v", "mkv", "mov", "mp4", "mpeg", "rm", "rmvb", "ts", "vob", "webm", "wmv"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_ignored_folders() -> Vec<String> {
    vec!["^\\.".to_string(), "^#recycle$".to_string(), "^@eaDir$".to_string()]
}

/// Sanitized config for API responses (scrape environment values hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub rules: RulesConfig,
    pub executor: ExecutorConfig,
    pub scan: ScanConfig,
    pub watcher: WatcherConfig,
    pub scheduler: SchedulerConfig,
    pub scrape: SanitizedScrapeConfig,
}

/// Scrape program settings with environment values redacted
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedScrapeConfig {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_pattern: Option<String>,
    /// Names of the environment variables passed to the program.
    pub env: Vec<String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let env: BTreeMap<_, _> = config.scrape.env.iter().collect();
        Self {
            server: config.server.clone(),
            database: config.database.clone(),
            rules: config.rules.clone(),
            executor: config.executor.clone(),
            scan: config.scan.clone(),
            watcher: config.watcher.clone(),
            scheduler: config.scheduler.clone(),
            scrape: SanitizedScrapeConfig {
                program: config.scrape.program.clone(),
                args: config.scrape.args.clone(),
                work_dir: config.scrape.work_dir.clone(),
                identity_pattern: config.scrape.identity_pattern.clone(),
                env: env.keys().map(|k| k.to_string()).collect(),
            },
        }
    }
}
