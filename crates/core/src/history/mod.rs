//! Append-only history of terminal tasks and their logs.

mod cleanup;
mod service;
mod sqlite;
mod store;

pub use cleanup::{AssetCleaner, FsAssetCleaner};
pub use service::{DeleteMode, DeleteReport, HistoryService};
pub use sqlite::SqliteHistoryStore;
pub use store::{HistoryError, HistoryFilter, HistoryRecord, HistoryStore};
