//! Task orchestration engine for a media-metadata scrape pipeline.
//!
//! Manual selections, a directory watcher and scheduled sweeps all propose
//! work to one [`queue::TaskQueue`]. A bounded [`queue::TaskExecutor`]
//! resolves the effective rule configuration per task, invokes the
//! [`scrape::ScrapeCore`] and appends every terminal task to history.

pub mod config;
pub mod engine;
pub mod history;
pub mod metrics;
pub mod queue;
pub mod rules;
pub mod scheduler;
pub mod scrape;
pub mod task;
pub mod testing;
pub mod watcher;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, SanitizedConfig,
};
pub use engine::{
    Engine, EngineError, EngineParts, EngineStatus, ManualReport, ManualSubmission, RejectedItem,
};
pub use history::{DeleteMode, HistoryError, HistoryFilter, HistoryRecord, HistoryService};
pub use queue::{QueueError, SubmitOutcome, TaskExecutor, TaskQueue};
pub use rules::{EffectiveConfig, RuleError, RuleResolver, RuleStore};
pub use scrape::{ScrapeCore, ScrapeError, ScrapeSummary};
pub use task::{Task, TaskId, TaskState, TriggerOrigin, WorkItem};
