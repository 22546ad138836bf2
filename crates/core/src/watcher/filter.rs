//! File selection shared by the watcher, the scheduler and manual
//! directory submissions.

use regex_lite::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::WatcherError;
use crate::config::ScanConfig;

/// Extension allow-list, minimum size and ignored folders.
#[derive(Debug, Clone)]
pub struct ScanFilter {
    extensions: HashSet<String>,
    minimum_size: u64,
    ignored_folders: Vec<Regex>,
}

impl ScanFilter {
    pub fn from_config(config: &ScanConfig) -> Result<Self, WatcherError> {
        let extensions = config
            .extensions
            .iter()
            .flat_map(|entry| entry.split(';'))
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();

        let ignored_folders = config
            .ignored_folder_patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern)
                    .map_err(|e| WatcherError::Filter(format!("{}: {}", pattern, e)))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            extensions,
            minimum_size: config.minimum_size_bytes,
            ignored_folders,
        })
    }

    /// Whether the file name carries an accepted extension.
    pub fn matches_extension(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| self.extensions.contains(&ext.to_string_lossy().to_lowercase()))
            .unwrap_or(false)
    }

    /// Files must be strictly larger than the configured minimum.
    pub fn accepts_size(&self, size: u64) -> bool {
        size > self.minimum_size
    }

    pub fn is_ignored_folder(&self, name: &str) -> bool {
        self.ignored_folders.iter().any(|re| re.is_match(name))
    }

    /// Whether any folder between `root` and `path` is ignored.
    pub fn in_ignored_folder(&self, root: &Path, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(root) else {
            return false;
        };
        let Some(parent) = relative.parent() else {
            return false;
        };
        parent
            .components()
            .any(|c| self.is_ignored_folder(&c.as_os_str().to_string_lossy()))
    }

    /// Candidate check for a path reported under `root`, before its size is
    /// known.
    pub fn wants(&self, root: &Path, path: &Path) -> bool {
        self.matches_extension(path) && !self.in_ignored_folder(root, path)
    }

    /// Walk `root` exhaustively and return every accepted file, sorted.
    pub fn collect(&self, root: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0
                    || !entry.file_type().is_dir()
                    || !self.is_ignored_folder(&entry.file_name().to_string_lossy())
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| self.matches_extension(entry.path()))
            .filter(|entry| {
                entry
                    .metadata()
                    .map(|m| self.accepts_size(m.len()))
                    .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }
}
