//! Rule value types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// A named partial overlay over the global rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePreset {
    pub name: String,
    pub overlay: Map<String, Value>,
}

/// The merged configuration a task runs with.
///
/// This is a plain value. Once a task holds one, later edits to the
/// global document or to presets cannot reach it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectiveConfig(Map<String, Value>);

impl EffectiveConfig {
    pub fn new(map: Map<String, Value>) -> Self {
        Self(map)
    }

    /// Look up a dotted key path, e.g. `scanner.input_directory`.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Set a dotted key path, creating intermediate objects as needed.
    /// Non-object intermediates are replaced.
    pub fn set(&mut self, path: &str, value: Value) {
        let parts: Vec<&str> = path.split('.').collect();
        let Some((last, parents)) = parts.split_last() else {
            return;
        };

        let mut current = &mut self.0;
        for part in parents {
            let entry = current
                .entry(part.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(map) = entry else {
                return;
            };
            current = map;
        }
        current.insert(last.to_string(), value);
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Hex SHA-256 of the canonical JSON encoding. Keys are sorted, so two
    /// equal configurations always share a digest.
    pub fn digest(&self) -> String {
        let encoded = serde_json::to_vec(&self.0).unwrap_or_default();
        let hash = Sha256::digest(&encoded);
        hash.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Merge `overlay` into `base`. Nested objects merge key by key; every
/// other value, arrays included, replaces what `base` had.
pub fn deep_merge(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                deep_merge(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}
