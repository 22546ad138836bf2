//! File-backed rule store.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info};

use super::store::{merge_global, normalize_preset_name, overlay_object, RuleStore};
use super::types::RulePreset;
use super::RuleError;

/// Rule store backed by two JSON documents: the global rules and a map of
/// preset name to overlay. Missing files read as empty documents.
pub struct JsonRuleStore {
    global_path: PathBuf,
    presets_path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonRuleStore {
    pub fn new(global_path: impl Into<PathBuf>, presets_path: impl Into<PathBuf>) -> Self {
        Self {
            global_path: global_path.into(),
            presets_path: presets_path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn global_path(&self) -> &Path {
        &self.global_path
    }

    pub fn presets_path(&self) -> &Path {
        &self.presets_path
    }

    fn read_object(path: &Path) -> Result<Map<String, Value>, RuleError> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Map::new()),
            Err(e) => {
                return Err(RuleError::Unavailable(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        if raw.trim().is_empty() {
            return Ok(Map::new());
        }

        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(RuleError::Unavailable(format!(
                "{} does not contain a JSON object",
                path.display()
            ))),
            Err(e) => Err(RuleError::Unavailable(format!(
                "failed to parse {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Write through a temporary sibling and rename it into place.
    fn write_object(path: &Path, map: &Map<String, Value>) -> Result<(), RuleError> {
        let unavailable =
            |e: std::io::Error| RuleError::Unavailable(format!("failed to write {}: {}", path.display(), e));

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(unavailable)?;
        }

        let encoded = serde_json::to_vec_pretty(map)
            .map_err(|e| RuleError::MalformedOverlay(e.to_string()))?;

        let mut tmp = path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, encoded).map_err(unavailable)?;
        fs::rename(&tmp, path).map_err(unavailable)?;
        debug!(path = %path.display(), "Rule document written");
        Ok(())
    }
}

impl RuleStore for JsonRuleStore {
    fn global(&self) -> Result<Map<String, Value>, RuleError> {
        Self::read_object(&self.global_path)
    }

    fn presets(&self) -> Result<BTreeMap<String, Map<String, Value>>, RuleError> {
        let raw = Self::read_object(&self.presets_path)?;
        let mut presets = BTreeMap::new();
        for (name, overlay) in raw {
            let overlay = overlay_object(&name, overlay)
                .map_err(|e| RuleError::Unavailable(e.to_string()))?;
            presets.insert(name, overlay);
        }
        Ok(presets)
    }

    fn upsert_preset(&self, name: &str, overlay: Value) -> Result<RulePreset, RuleError> {
        let name = normalize_preset_name(name)?;
        let overlay = overlay_object(&name, overlay)?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| RuleError::Unavailable(e.to_string()))?;

        let mut all = Self::read_object(&self.presets_path)?;
        all.insert(name.clone(), Value::Object(overlay.clone()));
        Self::write_object(&self.presets_path, &all)?;

        info!(preset = %name, "Rule preset saved");
        Ok(RulePreset { name, overlay })
    }

    fn update_global(&self, patch: Value) -> Result<Map<String, Value>, RuleError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| RuleError::Unavailable(e.to_string()))?;

        let merged = merge_global(Self::read_object(&self.global_path)?, patch)?;
        Self::write_object(&self.global_path, &merged)?;

        info!(keys = merged.len(), "Global rules updated");
        Ok(merged)
    }

    fn delete_preset(&self, name: &str) -> Result<bool, RuleError> {
        let name = name.trim();
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| RuleError::Unavailable(e.to_string()))?;

        let mut all = Self::read_object(&self.presets_path)?;
        if all.remove(name).is_none() {
            return Ok(false);
        }
        Self::write_object(&self.presets_path, &all)?;

        info!(preset = %name, "Rule preset deleted");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_test_store(dir: &TempDir) -> JsonRuleStore {
        JsonRuleStore::new(
            dir.path().join("config.json"),
            dir.path().join("rules/presets.json"),
        )
    }

    #[test]
    fn test_missing_files_read_as_empty() {
        let dir = TempDir::new().unwrap();
        let store = create_test_store(&dir);
        assert!(store.global().unwrap().is_empty());
        assert!(store.presets().unwrap().is_empty());
    }

    #[test]
    fn test_upsert_persists_and_creates_parent() {
        let dir = TempDir::new().unwrap();
        let store = create_test_store(&dir);

        store
            .upsert_preset(" uncensored ", json!({ "crawler": { "selection": ["x"] } }))
            .unwrap();

        let reopened = create_test_store(&dir);
        let preset = reopened.preset("uncensored").unwrap().unwrap();
        assert_eq!(preset.overlay["crawler"]["selection"], json!(["x"]));
        assert!(!dir.path().join("rules/presets.json.tmp").exists());
    }

    #[test]
    fn test_delete_preset() {
        let dir = TempDir::new().unwrap();
        let store = create_test_store(&dir);
        store.upsert_preset("a", json!({})).unwrap();
        store.upsert_preset("b", json!({ "k": 1 })).unwrap();

        assert!(store.delete_preset("a").unwrap());
        assert!(!store.delete_preset("a").unwrap());

        let names: Vec<_> = store.presets().unwrap().into_keys().collect();
        assert_eq!(names, vec!["b".to_string()]);
    }

    #[test]
    fn test_update_global_persists_merge() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"crawler": {"retries": 3, "hardlink": true}}"#,
        )
        .unwrap();
        let store = create_test_store(&dir);

        let merged = store
            .update_global(json!({ "crawler": { "retries": 1 }, "summarizer": { "move": false } }))
            .unwrap();
        assert_eq!(merged["crawler"]["hardlink"], json!(true));

        let reopened = create_test_store(&dir);
        let global = reopened.global().unwrap();
        assert_eq!(global["crawler"]["retries"], json!(1));
        assert_eq!(global["crawler"]["hardlink"], json!(true));
        assert_eq!(global["summarizer"]["move"], json!(false));
        assert!(!dir.path().join("config.json.tmp").exists());
    }

    #[test]
    fn test_update_global_refuses_corrupt_document() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.json"), "{ not json").unwrap();
        let store = create_test_store(&dir);

        assert!(matches!(
            store.update_global(json!({ "k": 1 })),
            Err(RuleError::Unavailable(_))
        ));
        assert_eq!(
            fs::read_to_string(dir.path().join("config.json")).unwrap(),
            "{ not json"
        );
    }

    #[test]
    fn test_corrupt_global_is_unavailable() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("config.json"), "{ not json").unwrap();
        let store = create_test_store(&dir);
        assert!(matches!(store.global(), Err(RuleError::Unavailable(_))));
    }

    #[test]
    fn test_non_object_preset_entry_is_unavailable() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("rules")).unwrap();
        fs::write(dir.path().join("rules/presets.json"), r#"{"bad": 3}"#).unwrap();
        let store = create_test_store(&dir);
        assert!(matches!(store.presets(), Err(RuleError::Unavailable(_))));
    }
}
