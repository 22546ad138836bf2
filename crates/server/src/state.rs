use std::path::Path;
use std::sync::Arc;
use curator_core::{Config, Engine, RuleStore, SanitizedConfig};

/// Shared application state
pub struct AppState {
    config: Config,
    engine: Arc<Engine>,
}

impl AppState {
    pub fn new(config: Config, engine: Arc<Engine>) -> Self {
        Self { config, engine }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Directory the file browser is confined to: the watcher root, else
    /// the sweep root.
    pub fn media_root(&self) -> Option<&Path> {
        self.config
            .watcher
            .root
            .as_deref()
            .or(self.config.scheduler.root.as_deref())
    }

    /// Backing store for global rules and presets.
    pub fn rules(&self) -> &Arc<dyn RuleStore> {
        self.engine.resolver.store()
    }
}
