use super::{types::Config, ConfigError};
use crate::scheduler::Schedule;

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Executor has at least one worker and a non-zero task timeout
/// - Watcher stability interval is non-zero and a root is set when enabled
/// - Scheduler expression parses and a sweep root is known when enabled
/// - Scan extensions are present when an automatic trigger is enabled
/// - Ignored folder patterns compile
/// - The scrape event marker is non-empty and the identity pattern compiles
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.executor.workers == 0 {
        return Err(ConfigError::ValidationError(
            "executor.workers must be at least 1".to_string(),
        ));
    }

    if config.executor.task_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "executor.task_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.watcher.stability_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "watcher.stability_interval_ms cannot be 0".to_string(),
        ));
    }

    if config.watcher.enabled && config.watcher.root.is_none() {
        return Err(ConfigError::ValidationError(
            "watcher.root is required when the watcher is enabled".to_string(),
        ));
    }

    if config.scheduler.enabled {
        Schedule::from_spec(&config.scheduler.schedule)
            .map_err(|e| ConfigError::ValidationError(format!("scheduler.schedule: {}", e)))?;

        if config.scheduler.root.is_none() && config.watcher.root.is_none() {
            return Err(ConfigError::ValidationError(
                "scheduler.root (or watcher.root) is required when the scheduler is enabled"
                    .to_string(),
            ));
        }
    }

    let automatic = config.watcher.enabled || config.scheduler.enabled;
    if automatic && config.scan.extensions.iter().all(|e| e.trim().is_empty()) {
        return Err(ConfigError::ValidationError(
            "scan.extensions cannot be empty when the watcher or scheduler is enabled".to_string(),
        ));
    }

    for pattern in &config.scan.ignored_folder_patterns {
        regex_lite::Regex::new(pattern).map_err(|e| {
            ConfigError::ValidationError(format!(
                "scan.ignored_folder_patterns: invalid pattern '{}': {}",
                pattern, e
            ))
        })?;
    }

    if config.scrape.event_marker.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "scrape.event_marker cannot be empty".to_string(),
        ));
    }

    if let Some(pattern) = &config.scrape.identity_pattern {
        regex_lite::Regex::new(pattern).map_err(|e| {
            ConfigError::ValidationError(format!(
                "scrape.identity_pattern: invalid pattern '{}': {}",
                pattern, e
            ))
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::ScheduleSpec;
    use std::path::PathBuf;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = Config::default();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_zero_workers_fails() {
        let mut config = Config::default();
        config.executor.workers = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_timeout_fails() {
        let mut config = Config::default();
        config.executor.task_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_enabled_watcher_requires_root() {
        let mut config = Config::default();
        config.watcher.enabled = true;
        assert!(validate_config(&config).is_err());

        config.watcher.root = Some(PathBuf::from("/srv/inbox"));
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_bad_cron_fails() {
        let mut config = Config::default();
        config.scheduler.enabled = true;
        config.scheduler.root = Some(PathBuf::from("/srv/library"));
        config.scheduler.schedule = ScheduleSpec::Cron {
            cron: "not a cron".to_string(),
        };
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("scheduler.schedule"));
    }

    #[test]
    fn test_validate_empty_extensions_with_watcher_fails() {
        let mut config = Config::default();
        config.watcher.enabled = true;
        config.watcher.root = Some(PathBuf::from("/srv/inbox"));
        config.scan.extensions = vec![];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_bad_ignore_pattern_fails() {
        let mut config = Config::default();
        config.scan.ignored_folder_patterns = vec!["(".to_string()];
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_empty_event_marker_fails() {
        let mut config = Config::default();
        config.scrape.event_marker = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("scrape.event_marker"));
    }

    #[test]
    fn test_validate_bad_identity_pattern_fails() {
        let mut config = Config::default();
        config.scrape.identity_pattern = Some("([A-Z]+".to_string());
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("scrape.identity_pattern"));

        config.scrape.identity_pattern = Some(r"([A-Z]{2,5}-\d{3,5})".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
