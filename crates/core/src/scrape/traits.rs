//! Scrape core trait.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

use super::{ScrapeError, ScrapeRequest, ScrapeSummary};
use crate::task::TaskLog;

/// A scrape core processes one title at a time.
#[async_trait]
pub trait ScrapeCore: Send + Sync {
    /// Returns the name of this implementation.
    fn name(&self) -> &str;

    /// Run the scrape for one task, streaming output lines into `log` as
    /// they are produced.
    ///
    /// Dropping the returned future must abandon the work.
    async fn run(
        &self,
        request: ScrapeRequest,
        log: Arc<TaskLog>,
    ) -> Result<ScrapeSummary, ScrapeError>;

    /// Whether a running invocation can be interrupted at the engine's
    /// request. When false, cancelling a running task waits for the run
    /// to finish and discards its result.
    fn supports_interrupt(&self) -> bool {
        false
    }

    /// Extract a title identifier from file names without any I/O.
    fn identify(&self, _paths: &[PathBuf]) -> Option<String> {
        None
    }
}
