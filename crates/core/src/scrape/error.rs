//! Scrape core errors.

use thiserror::Error;

/// Errors reported by a scrape core run.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Nothing matched the source file(s).
    #[error("no metadata found: {0}")]
    NoMatch(String),

    /// Recognized, non-fatal scrape failure.
    #[error("{0}")]
    Domain(String),

    /// The scrape core cannot do useful work (e.g. output directory
    /// unwritable, program missing).
    #[error("unrecoverable scrape error: {0}")]
    Fatal(String),

    /// Disk, memory or file-handle limits hit.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The run was interrupted at the engine's request.
    #[error("scrape interrupted")]
    Interrupted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScrapeError {
    /// Returns true if the queue should simply move on to the next item.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ScrapeError::NoMatch(_) | ScrapeError::Domain(_) | ScrapeError::Interrupted
        )
    }
}
