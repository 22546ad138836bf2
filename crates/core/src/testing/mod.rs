//! Testing utilities and mock implementations.
//!
//! # Example
//!
//! ```rust,ignore
//! use curator_core::testing::{fixtures, MockScrapeCore};
//!
//! let core = MockScrapeCore::new();
//! core.set_summary(fixtures::summary("ABC-123", "/library/ABC-123")).await;
//!
//! // Hand `core` to a TaskExecutor...
//! ```

mod mock_scrape_core;

pub use mock_scrape_core::{MockScrapeCore, RecordedRun};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::PathBuf;

    use crate::scrape::{AssetKind, AssetStatus, ScrapeSummary};
    use crate::task::{Task, TaskState, TriggerOrigin, WorkItem};

    /// A manual work item for one file.
    pub fn work_item(path: &str) -> WorkItem {
        WorkItem::single(path, TriggerOrigin::Manual)
    }

    /// A successful summary with an output directory.
    pub fn summary(identifier: &str, output_dir: &str) -> ScrapeSummary {
        ScrapeSummary {
            identifier: Some(identifier.to_string()),
            output_dir: Some(PathBuf::from(output_dir)),
            target_basename: Some(identifier.to_string()),
            assets: vec![AssetStatus {
                kind: AssetKind::Cover,
                success: true,
                downloaded: 1,
                failed: 0,
                urls: vec![format!("https://img.example/{}.jpg", identifier)],
                reason: None,
            }],
            crawlers: vec!["mock".to_string()],
            ..Default::default()
        }
    }

    /// A summary whose fanart downloads partly failed.
    pub fn partial_asset_summary(identifier: &str, output_dir: &str) -> ScrapeSummary {
        let mut summary = summary(identifier, output_dir);
        summary.assets.push(AssetStatus {
            kind: AssetKind::Fanart,
            success: false,
            downloaded: 2,
            failed: 1,
            urls: Vec::new(),
            reason: None,
        });
        summary
    }

    /// A terminal task for `path`, ready to append to history.
    pub fn finished_task(path: &str, state: TaskState) -> Task {
        let item = work_item(path);
        let mut task = Task::from_work_item(&item, format!("path:{}", path));
        task.finish(state);
        task
    }

    /// A succeeded task whose output lives in `output_dir`.
    pub fn succeeded_task(path: &str, output_dir: &str) -> Task {
        let identifier = PathBuf::from(path)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        finished_task(
            path,
            TaskState::Succeeded {
                summary: summary(&identifier, output_dir),
            },
        )
    }
}
