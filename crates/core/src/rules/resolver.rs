//! Effective configuration resolution.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::store::RuleStore;
use super::types::{deep_merge, EffectiveConfig};
use super::RuleError;

/// Preset name that always means "the global rules".
pub const DEFAULT_PRESET: &str = "default";

/// Merges presets over the global rules.
#[derive(Clone)]
pub struct RuleResolver {
    store: Arc<dyn RuleStore>,
}

impl RuleResolver {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn RuleStore> {
        &self.store
    }

    /// Resolve the effective configuration for a preset.
    ///
    /// `None`, an empty name and `"default"` all resolve to the global rules.
    /// Reads the store and nothing else.
    pub fn resolve(&self, preset: Option<&str>) -> Result<EffectiveConfig, RuleError> {
        let mut merged = self.store.global()?;

        if let Some(name) = preset_name(preset) {
            let preset = self
                .store
                .preset(name)?
                .ok_or_else(|| RuleError::UnknownPreset(name.to_string()))?;
            deep_merge(&mut merged, &preset.overlay);
        }

        Ok(EffectiveConfig::new(merged))
    }

    /// Check that a preset can be resolved without building the result.
    pub fn check(&self, preset: Option<&str>) -> Result<(), RuleError> {
        match preset_name(preset) {
            None => self.store.global().map(|_| ()),
            Some(name) => match self.store.preset(name)? {
                Some(_) => Ok(()),
                None => Err(RuleError::UnknownPreset(name.to_string())),
            },
        }
    }

    /// Resolve and apply the per-task overrides: the input directory is
    /// pinned to the task's source location and interactive confirmation
    /// is switched off.
    pub fn resolve_for_task(
        &self,
        preset: Option<&str>,
        paths: &[PathBuf],
    ) -> Result<EffectiveConfig, RuleError> {
        let mut config = self.resolve(preset)?;

        if let Some(dir) = input_directory(paths) {
            config.set(
                "scanner.input_directory",
                Value::String(dir.to_string_lossy().into_owned()),
            );
        }
        config.set("scanner.manual", Value::Bool(false));

        Ok(config)
    }
}

fn preset_name(preset: Option<&str>) -> Option<&str> {
    preset
        .map(str::trim)
        .filter(|name| !name.is_empty() && *name != DEFAULT_PRESET)
}

/// The directory the scrape core should scan for this task.
fn input_directory(paths: &[PathBuf]) -> Option<&Path> {
    let first = paths.iter().min()?;
    if first.is_dir() {
        Some(first.as_path())
    } else {
        first.parent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::MemoryRuleStore;
    use serde_json::json;

    fn create_test_resolver() -> (Arc<MemoryRuleStore>, RuleResolver) {
        let global = json!({
            "crawler": { "selection": ["site_a", "site_b"], "retries": 3 },
            "scanner": { "manual": true }
        });
        let store = Arc::new(MemoryRuleStore::new(global.as_object().cloned().unwrap()));
        let resolver = RuleResolver::new(store.clone());
        (store, resolver)
    }

    #[test]
    fn test_resolve_without_preset_is_global() {
        let (store, resolver) = create_test_resolver();
        let global = store.global().unwrap();

        assert_eq!(resolver.resolve(None).unwrap().as_map(), &global);
        assert_eq!(resolver.resolve(Some("default")).unwrap().as_map(), &global);
        assert_eq!(resolver.resolve(Some("  ")).unwrap().as_map(), &global);
    }

    #[test]
    fn test_resolve_preset_wins_field_by_field() {
        let (store, resolver) = create_test_resolver();
        store
            .upsert_preset("quick", json!({ "crawler": { "retries": 0 } }))
            .unwrap();

        let config = resolver.resolve(Some("quick")).unwrap();
        assert_eq!(config.get("crawler.retries"), Some(&json!(0)));
        assert_eq!(
            config.get("crawler.selection"),
            Some(&json!(["site_a", "site_b"]))
        );
    }

    #[test]
    fn test_resolve_unknown_preset() {
        let (_, resolver) = create_test_resolver();
        let err = resolver.resolve(Some("missing")).unwrap_err();
        assert!(matches!(err, RuleError::UnknownPreset(ref n) if n == "missing"));
        assert!(resolver.check(Some("missing")).is_err());
        assert!(resolver.check(None).is_ok());
    }

    #[test]
    fn test_resolved_config_is_a_snapshot() {
        let (store, resolver) = create_test_resolver();
        store
            .upsert_preset("p", json!({ "crawler": { "retries": 7 } }))
            .unwrap();

        let snapshot = resolver.resolve(Some("p")).unwrap();
        store
            .upsert_preset("p", json!({ "crawler": { "retries": 99 } }))
            .unwrap();

        assert_eq!(snapshot.get("crawler.retries"), Some(&json!(7)));
        assert_eq!(
            resolver.resolve(Some("p")).unwrap().get("crawler.retries"),
            Some(&json!(99))
        );
    }

    #[test]
    fn test_resolve_for_task_applies_overrides() {
        let (_, resolver) = create_test_resolver();
        let paths = vec![
            PathBuf::from("/media/inbox/b/ABC-123.mp4"),
            PathBuf::from("/media/inbox/a/ABC-123-2.mp4"),
        ];

        let config = resolver.resolve_for_task(None, &paths).unwrap();
        assert_eq!(
            config.get("scanner.input_directory"),
            Some(&json!("/media/inbox/a"))
        );
        assert_eq!(config.get("scanner.manual"), Some(&json!(false)));
    }
}
