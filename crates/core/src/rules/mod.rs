//! Rule presets and effective configuration resolution.
//!
//! The global rule document and the named presets live in a [`RuleStore`].
//! The [`RuleResolver`] merges a preset over the global document and hands
//! out an immutable [`EffectiveConfig`] value that tasks snapshot at dequeue.

mod json_store;
mod resolver;
mod store;
mod types;

pub use json_store::JsonRuleStore;
pub use resolver::{RuleResolver, DEFAULT_PRESET};
pub use store::{normalize_preset_name, MemoryRuleStore, RuleStore};
pub use types::{deep_merge, EffectiveConfig, RulePreset};

use thiserror::Error;

/// Errors raised while reading or resolving rules.
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("unknown preset: {0}")]
    UnknownPreset(String),

    #[error("malformed overlay: {0}")]
    MalformedOverlay(String),

    #[error("configuration store unavailable: {0}")]
    Unavailable(String),
}
