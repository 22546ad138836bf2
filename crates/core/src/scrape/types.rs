//! Scrape request and result types.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::rules::EffectiveConfig;
use crate::task::TaskId;

/// Input for one scrape core run.
#[derive(Debug, Clone)]
pub struct ScrapeRequest {
    pub task_id: TaskId,
    pub paths: Vec<PathBuf>,
    pub config: EffectiveConfig,
}

/// Kind of downloaded artwork.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    Cover,
    Fanart,
}

/// Download outcome for one kind of artwork.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetStatus {
    pub kind: AssetKind,
    pub success: bool,
    #[serde(default)]
    pub downloaded: u32,
    #[serde(default)]
    pub failed: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Result summary of a scrape run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ScrapeSummary {
    /// Matched title identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Directory the organized output was written to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_basename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfo_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fanart_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extrafanart_dir: Option<PathBuf>,
    #[serde(default)]
    pub assets: Vec<AssetStatus>,
    /// Metadata sources that contributed.
    #[serde(default)]
    pub crawlers: Vec<String>,
}

impl ScrapeSummary {
    pub fn failed_assets(&self) -> impl Iterator<Item = &AssetStatus> {
        self.assets.iter().filter(|a| !a.success || a.failed > 0)
    }

    pub fn has_asset_failures(&self) -> bool {
        self.failed_assets().next().is_some()
    }

    /// Human-readable description of the asset failures.
    pub fn asset_failure_reason(&self) -> Option<String> {
        let parts: Vec<String> = self
            .failed_assets()
            .map(|a| {
                let kind = match a.kind {
                    AssetKind::Cover => "cover",
                    AssetKind::Fanart => "fanart",
                };
                match &a.reason {
                    Some(reason) => format!("{}: {}", kind, reason),
                    None if a.failed > 0 => format!("{}: {} downloads failed", kind, a.failed),
                    None => format!("{}: download failed", kind),
                }
            })
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(format!("partial asset download failure ({})", parts.join(", ")))
        }
    }
}

/// Structured summary event emitted by the scrape program on stdout,
/// e.g. `{"type":"summary","kind":"movie","dvdid":"ABC-123",...}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SummaryEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub dvdid: Option<String>,
    #[serde(default)]
    pub cid: Option<String>,
    #[serde(default)]
    pub save_dir: Option<PathBuf>,
    #[serde(default)]
    pub basename: Option<String>,
    #[serde(default)]
    pub nfo_file: Option<PathBuf>,
    #[serde(default)]
    pub poster_file: Option<PathBuf>,
    #[serde(default)]
    pub fanart_file: Option<PathBuf>,
    #[serde(default)]
    pub extrafanart_dir: Option<PathBuf>,
    #[serde(default)]
    pub cover_urls: Vec<String>,
    #[serde(default)]
    pub cover_download_success: Option<bool>,
    #[serde(default)]
    pub fanart_urls: Vec<String>,
    #[serde(default)]
    pub fanart_download_success: Option<bool>,
    #[serde(default)]
    pub fanart_download_count: u32,
    #[serde(default)]
    pub fanart_download_failed_count: u32,
    #[serde(default)]
    pub used_crawlers: Vec<String>,
}

impl SummaryEvent {
    /// Returns true for the per-title summary event.
    pub fn is_title_summary(&self) -> bool {
        self.event_type == "summary" && self.kind.as_deref().map_or(true, |k| k == "movie")
    }

    pub fn into_summary(self) -> ScrapeSummary {
        let mut assets = Vec::new();

        if let Some(success) = self.cover_download_success {
            assets.push(AssetStatus {
                kind: AssetKind::Cover,
                success,
                downloaded: u32::from(success),
                failed: u32::from(!success),
                reason: (!success).then(|| {
                    if self.cover_urls.is_empty() {
                        "no cover url available".to_string()
                    } else {
                        "cover download failed".to_string()
                    }
                }),
                urls: self.cover_urls,
            });
        }

        if let Some(success) = self.fanart_download_success {
            assets.push(AssetStatus {
                kind: AssetKind::Fanart,
                success,
                downloaded: self.fanart_download_count,
                failed: self.fanart_download_failed_count,
                reason: None,
                urls: self.fanart_urls,
            });
        }

        ScrapeSummary {
            identifier: self.dvdid.or(self.cid),
            output_dir: self.save_dir,
            target_basename: self.basename,
            nfo_file: self.nfo_file,
            poster_file: self.poster_file,
            fanart_file: self.fanart_file,
            extrafanart_dir: self.extrafanart_dir,
            assets,
            crawlers: self.used_crawlers,
        }
    }
}
