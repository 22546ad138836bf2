//! Removal of output assets owned by deleted history records.

use std::io;
use std::path::{Component, Path, PathBuf};
use tracing::info;

use crate::task::normalize_path;

/// Removes the organized output of a deleted record.
pub trait AssetCleaner: Send + Sync {
    /// Remove `dir` and everything under it. Returns false if there was
    /// nothing to remove.
    fn remove(&self, dir: &Path) -> io::Result<bool>;
}

/// Filesystem cleaner. Optionally confined to a root directory.
#[derive(Debug, Clone, Default)]
pub struct FsAssetCleaner {
    root: Option<PathBuf>,
}

impl FsAssetCleaner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only remove directories strictly inside `root`.
    pub fn confined_to(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn check_allowed(&self, dir: &Path) -> io::Result<()> {
        let refuse = |reason: String| -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, reason))
        };

        if !dir.is_absolute() || dir.components().any(|c| c == Component::ParentDir) {
            return refuse(format!("refusing to remove {}", dir.display()));
        }
        // Refuse anything shallow enough to be a mount point or home.
        if normalize_path(dir).components().count() < 3 {
            return refuse(format!("refusing to remove {}", dir.display()));
        }
        if let Some(root) = &self.root {
            let root = normalize_path(root);
            if !is_strictly_inside(&normalize_path(dir), &root) {
                return refuse(format!("{} is outside {}", dir.display(), root.display()));
            }
            // Symlinked ancestors must not lead out of the root either.
            if let (Ok(real_dir), Ok(real_root)) = (dir.canonicalize(), root.canonicalize()) {
                if !is_strictly_inside(&real_dir, &real_root) {
                    return refuse(format!("{} resolves outside {}", dir.display(), root.display()));
                }
            }
        }
        Ok(())
    }
}

fn is_strictly_inside(dir: &Path, root: &Path) -> bool {
    dir.starts_with(root) && dir != root
}

impl AssetCleaner for FsAssetCleaner {
    fn remove(&self, dir: &Path) -> io::Result<bool> {
        self.check_allowed(dir)?;
        match std::fs::remove_dir_all(dir) {
            Ok(()) => {
                info!(path = %dir.display(), "Removed output directory");
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}
