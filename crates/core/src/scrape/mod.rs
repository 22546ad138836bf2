//! Scrape core boundary.
//!
//! The scrape core maps one title (one or more source files) to fetched
//! metadata and organized output. The engine treats it as a black box
//! behind the [`ScrapeCore`] trait.
//!
//! # Example
//!
//! ```ignore
//! use curator_core::scrape::{CommandScrapeCore, ScrapeConfig, ScrapeCore, ScrapeRequest};
//!
//! let core = CommandScrapeCore::new(ScrapeConfig {
//!     program: "/usr/local/bin/scrape".into(),
//!     args: vec!["--config".into(), "{config}".into()],
//!     ..Default::default()
//! });
//!
//! let log = Arc::new(TaskLog::new(2000));
//! let summary = core.run(request, log.clone()).await?;
//! println!("organized into {:?}", summary.output_dir);
//! ```

mod command;
mod config;
mod error;
mod traits;
mod types;

pub use command::{strip_ansi, CommandScrapeCore};
pub use config::ScrapeConfig;
pub use error::ScrapeError;
pub use traits::ScrapeCore;
pub use types::{AssetKind, AssetStatus, ScrapeRequest, ScrapeSummary, SummaryEvent};
