//! Scrape program configuration.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Configuration for the subprocess-backed scrape core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Program to run for each task.
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Arguments. `{config}` is replaced with the path of the task's
    /// effective configuration file, `{input}` with the first source path.
    #[serde(default = "default_args")]
    pub args: Vec<String>,

    /// Directory for per-task configuration files.
    #[serde(default = "default_work_dir")]
    pub work_dir: PathBuf,

    /// Extra environment variables for the program.
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Prefix marking structured event lines on the program's stdout.
    #[serde(default = "default_event_marker")]
    pub event_marker: String,

    /// Regex extracting a title identifier from a file name. The first
    /// capture group (or the whole match) becomes the identity.
    #[serde(default)]
    pub identity_pattern: Option<String>,
}

fn default_program() -> PathBuf {
    PathBuf::from("scrape")
}

fn default_args() -> Vec<String> {
    vec!["--config".to_string(), "{config}".to_string()]
}

fn default_work_dir() -> PathBuf {
    PathBuf::from("data/tasks")
}

fn default_event_marker() -> String {
    "SCRAPE_EVENT".to_string()
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: default_args(),
            work_dir: default_work_dir(),
            env: HashMap::new(),
            event_marker: default_event_marker(),
            identity_pattern: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_minimal() {
        let config: ScrapeConfig = toml::from_str(r#"program = "/opt/scrape/bin/run""#).unwrap();
        assert_eq!(config.program, PathBuf::from("/opt/scrape/bin/run"));
        assert_eq!(config.args, vec!["--config", "{config}"]);
        assert_eq!(config.event_marker, "SCRAPE_EVENT");
        assert!(config.identity_pattern.is_none());
    }

    #[test]
    fn test_deserialize_full() {
        let toml = r#"
            program = "python3"
            args = ["-m", "scraper", "-c", "{config}", "-i", "{input}"]
            work_dir = "/tmp/curator"
            event_marker = "EVT"
            identity_pattern = "([A-Z]{2,5}-\\d{3,5})"

            [env]
            HTTP_PROXY = "http://proxy:3128"
        "#;
        let config: ScrapeConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.args.len(), 6);
        assert_eq!(config.env.get("HTTP_PROXY").unwrap(), "http://proxy:3128");
        assert_eq!(
            config.identity_pattern.as_deref(),
            Some("([A-Z]{2,5}-\\d{3,5})")
        );
    }
}
