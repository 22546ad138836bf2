//! Read-only browser over the media root, one directory level at a time.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use curator_core::task::normalize_path;

use super::error::{api_error, ApiError};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct BrowseQuery {
    /// Absolute directory to list; defaults to the media root
    pub path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct FsEntry {
    pub name: String,
    pub path: PathBuf,
    pub is_dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct BrowseResponse {
    pub path: PathBuf,
    pub entries: Vec<FsEntry>,
}

/// List one level of a directory under the media root. Directories come
/// first, then files, each sorted by name. Hidden entries are skipped.
pub async fn browse(
    State(state): State<Arc<AppState>>,
    Query(query): Query<BrowseQuery>,
) -> Result<Json<BrowseResponse>, ApiError> {
    let root = state.media_root().map(Path::to_path_buf).ok_or_else(|| {
        api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "No media root configured (watcher.root or scheduler.root)",
        )
    })?;
    let requested = query.path.unwrap_or_else(|| root.clone());

    if !requested.is_absolute() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Path must be absolute"));
    }
    if requested.components().any(|c| c == Component::ParentDir) {
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "Path may not contain '..' segments",
        ));
    }

    let listed = tokio::task::spawn_blocking(move || list_confined(&root, &requested))
        .await
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    match listed {
        Ok(response) => {
            debug!(path = %response.path.display(), entries = response.entries.len(), "Directory listed");
            Ok(Json(response))
        }
        Err(BrowseError::Outside) => Err(api_error(
            StatusCode::FORBIDDEN,
            "Only directories under the media root can be browsed",
        )),
        Err(BrowseError::NotADirectory(path)) => Err(api_error(
            StatusCode::BAD_REQUEST,
            format!("Not a directory: {}", path.display()),
        )),
        Err(BrowseError::Io(path, e)) if e.kind() == ErrorKind::NotFound => Err(api_error(
            StatusCode::NOT_FOUND,
            format!("Directory not found: {}", path.display()),
        )),
        Err(BrowseError::Io(path, e)) => {
            warn!(path = %path.display(), error = %e, "Failed to list directory");
            Err(api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Cannot list {}: {}", path.display(), e),
            ))
        }
    }
}

enum BrowseError {
    Outside,
    NotADirectory(PathBuf),
    Io(PathBuf, io::Error),
}

fn list_confined(root: &Path, requested: &Path) -> Result<BrowseResponse, BrowseError> {
    if !normalize_path(requested).starts_with(normalize_path(root)) {
        return Err(BrowseError::Outside);
    }

    // Resolve symlinks on both sides so a link inside the root cannot lead out.
    let real_root = root
        .canonicalize()
        .map_err(|e| BrowseError::Io(root.to_path_buf(), e))?;
    let real = requested
        .canonicalize()
        .map_err(|e| BrowseError::Io(requested.to_path_buf(), e))?;
    if !real.starts_with(&real_root) {
        return Err(BrowseError::Outside);
    }
    if !real.is_dir() {
        return Err(BrowseError::NotADirectory(requested.to_path_buf()));
    }

    let reader = fs::read_dir(&real).map_err(|e| BrowseError::Io(requested.to_path_buf(), e))?;
    let mut entries = Vec::new();
    for entry in reader {
        // Entries that vanish or cannot be read mid-listing are skipped.
        let Ok(entry) = entry else { continue };
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with('.') {
            continue;
        }
        let Ok(metadata) = fs::metadata(entry.path()) else { continue };
        let is_dir = metadata.is_dir();
        entries.push(FsEntry {
            path: requested.join(&name),
            size: (!is_dir).then(|| metadata.len()),
            name,
            is_dir,
        });
    }
    entries.sort_by(|a, b| {
        b.is_dir
            .cmp(&a.is_dir)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });

    Ok(BrowseResponse {
        path: requested.to_path_buf(),
        entries,
    })
}
