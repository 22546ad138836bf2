//! Rule store trait and an in-memory implementation.

use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::RwLock;

use super::resolver::DEFAULT_PRESET;
use super::types::{deep_merge, RulePreset};
use super::RuleError;

/// Backing store for the global rules and the named presets.
///
/// The engine only reads through this trait. Writes come from the
/// presentation layer.
pub trait RuleStore: Send + Sync {
    /// The global rule document.
    fn global(&self) -> Result<Map<String, Value>, RuleError>;

    /// All presets, keyed by name.
    fn presets(&self) -> Result<BTreeMap<String, Map<String, Value>>, RuleError>;

    /// One preset by name.
    fn preset(&self, name: &str) -> Result<Option<RulePreset>, RuleError> {
        Ok(self.presets()?.remove(name).map(|overlay| RulePreset {
            name: name.to_string(),
            overlay,
        }))
    }

    /// Create or replace a preset.
    fn upsert_preset(&self, name: &str, overlay: Value) -> Result<RulePreset, RuleError>;

    /// Delete a preset. Returns false if it did not exist.
    fn delete_preset(&self, name: &str) -> Result<bool, RuleError>;

    /// Deep-merge `patch` onto the global document and store the result.
    /// Returns the merged document.
    fn update_global(&self, patch: Value) -> Result<Map<String, Value>, RuleError>;
}

/// Trim a preset name for storage. Empty names and the reserved default
/// name are rejected.
pub fn normalize_preset_name(name: &str) -> Result<String, RuleError> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(RuleError::MalformedOverlay(
            "preset name cannot be empty".to_string(),
        ));
    }
    if trimmed == DEFAULT_PRESET {
        return Err(RuleError::MalformedOverlay(format!(
            "'{}' is reserved for the global rules",
            DEFAULT_PRESET
        )));
    }
    Ok(trimmed.to_string())
}

/// Check a global patch and merge it onto `current`.
pub(super) fn merge_global(
    mut current: Map<String, Value>,
    patch: Value,
) -> Result<Map<String, Value>, RuleError> {
    let patch = match patch {
        Value::Object(map) => map,
        other => {
            return Err(RuleError::MalformedOverlay(format!(
                "global rules must be a JSON object, got {}",
                json_kind(&other)
            )))
        }
    };
    check_keys(&patch, "")?;
    deep_merge(&mut current, &patch);
    Ok(current)
}

/// Keys are addressed by dotted path, so they cannot be empty or contain dots.
fn check_keys(map: &Map<String, Value>, prefix: &str) -> Result<(), RuleError> {
    for (key, value) in map {
        if key.trim().is_empty() || key.contains('.') {
            return Err(RuleError::MalformedOverlay(format!(
                "invalid rule key '{}{}'",
                prefix, key
            )));
        }
        if let Value::Object(nested) = value {
            check_keys(nested, &format!("{}{}.", prefix, key))?;
        }
    }
    Ok(())
}

pub(super) fn overlay_object(name: &str, overlay: Value) -> Result<Map<String, Value>, RuleError> {
    match overlay {
        Value::Object(map) => Ok(map),
        other => Err(RuleError::MalformedOverlay(format!(
            "preset '{}' must be a JSON object, got {}",
            name,
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// In-memory rule store.
#[derive(Default)]
pub struct MemoryRuleStore {
    global: RwLock<Map<String, Value>>,
    presets: RwLock<BTreeMap<String, Map<String, Value>>>,
}

impl MemoryRuleStore {
    pub fn new(global: Map<String, Value>) -> Self {
        Self {
            global: RwLock::new(global),
            presets: RwLock::new(BTreeMap::new()),
        }
    }

    /// Replace the global document.
    pub fn set_global(&self, global: Map<String, Value>) {
        if let Ok(mut guard) = self.global.write() {
            *guard = global;
        }
    }
}

impl RuleStore for MemoryRuleStore {
    fn global(&self) -> Result<Map<String, Value>, RuleError> {
        self.global
            .read()
            .map(|g| g.clone())
            .map_err(|e| RuleError::Unavailable(e.to_string()))
    }

    fn presets(&self) -> Result<BTreeMap<String, Map<String, Value>>, RuleError> {
        self.presets
            .read()
            .map(|p| p.clone())
            .map_err(|e| RuleError::Unavailable(e.to_string()))
    }

    fn upsert_preset(&self, name: &str, overlay: Value) -> Result<RulePreset, RuleError> {
        let name = normalize_preset_name(name)?;
        let overlay = overlay_object(&name, overlay)?;
        let mut presets = self
            .presets
            .write()
            .map_err(|e| RuleError::Unavailable(e.to_string()))?;
        presets.insert(name.clone(), overlay.clone());
        Ok(RulePreset { name, overlay })
    }

    fn delete_preset(&self, name: &str) -> Result<bool, RuleError> {
        let mut presets = self
            .presets
            .write()
            .map_err(|e| RuleError::Unavailable(e.to_string()))?;
        Ok(presets.remove(name.trim()).is_some())
    }

    fn update_global(&self, patch: Value) -> Result<Map<String, Value>, RuleError> {
        let mut global = self
            .global
            .write()
            .map_err(|e| RuleError::Unavailable(e.to_string()))?;
        let merged = merge_global(global.clone(), patch)?;
        *global = merged.clone();
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalize_preset_name() {
        assert_eq!(normalize_preset_name("  fast ").unwrap(), "fast");
        assert!(matches!(
            normalize_preset_name("   "),
            Err(RuleError::MalformedOverlay(_))
        ));
        assert!(matches!(
            normalize_preset_name("default"),
            Err(RuleError::MalformedOverlay(_))
        ));
    }

    #[test]
    fn test_memory_store_upsert_and_delete() {
        let store = MemoryRuleStore::default();
        let preset = store
            .upsert_preset("fast", json!({ "crawler": { "retries": 1 } }))
            .unwrap();
        assert_eq!(preset.name, "fast");

        let fetched = store.preset("fast").unwrap().unwrap();
        assert_eq!(fetched.overlay["crawler"]["retries"], json!(1));

        assert!(store.delete_preset("fast").unwrap());
        assert!(!store.delete_preset("fast").unwrap());
        assert!(store.preset("fast").unwrap().is_none());
    }

    #[test]
    fn test_memory_store_rejects_non_object_overlay() {
        let store = MemoryRuleStore::default();
        let err = store.upsert_preset("bad", json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("an array"));
    }

    #[test]
    fn test_update_global_merges_nested_keys() {
        let store = MemoryRuleStore::new(
            json!({ "crawler": { "retries": 3, "selection": ["a", "b"] }, "proxy": "x" })
                .as_object()
                .cloned()
                .unwrap(),
        );

        let merged = store
            .update_global(json!({ "crawler": { "retries": 5 } }))
            .unwrap();
        assert_eq!(merged["crawler"]["retries"], json!(5));
        assert_eq!(merged["crawler"]["selection"], json!(["a", "b"]));
        assert_eq!(merged["proxy"], json!("x"));
        assert_eq!(store.global().unwrap(), merged);
    }

    #[test]
    fn test_update_global_rejects_bad_patch_unchanged() {
        let store = MemoryRuleStore::new(json!({ "k": 1 }).as_object().cloned().unwrap());

        let err = store.update_global(json!("nope")).unwrap_err();
        assert!(err.to_string().contains("a string"));

        let err = store
            .update_global(json!({ "crawler": { "a.b": 1 } }))
            .unwrap_err();
        assert!(err.to_string().contains("crawler.a.b"));

        assert!(matches!(
            store.update_global(json!({ " ": 1 })),
            Err(RuleError::MalformedOverlay(_))
        ));
        assert_eq!(store.global().unwrap()["k"], json!(1));
        assert_eq!(store.global().unwrap().len(), 1);
    }
}
