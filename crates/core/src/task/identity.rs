//! Canonical task identity.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

/// Extracts a title identifier from file names without touching the disk.
pub type IdentityHint = Arc<dyn Fn(&[PathBuf]) -> Option<String> + Send + Sync>;

/// Lexically normalize a path: drop `.` segments and fold `..` into the
/// parent. Symlinks are not resolved.
pub fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Canonical identity for a set of source paths.
///
/// `id:<IDENTIFIER>` when the hint recognises an identifier, otherwise
/// `path:<normalized path>` of the lexicographically first path.
pub fn canonical_identity(paths: &[PathBuf], hint: Option<&IdentityHint>) -> String {
    if let Some(id) = hint
        .and_then(|h| h(paths))
        .map(|id| id.trim().to_uppercase())
        .filter(|id| !id.is_empty())
    {
        return format!("id:{}", id);
    }

    let first = paths.iter().map(|p| normalize_path(p)).min().unwrap_or_default();
    format!("path:{}", first.display())
}
