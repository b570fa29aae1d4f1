//! Shared utility functions for tfkit crates

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Default directory of a deployment when none is configured
pub fn default_deployment_dir(deployment: &str) -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("tfkit")
        .join(deployment)
}

/// Ensure directory exists
pub fn ensure_dir(path: &Path) -> Result<()> {
    if path.is_dir() {
        info!("Directory already exists: {}", path.display());
    } else {
        info!("Creating directory: {}", path.display());
        std::fs::create_dir_all(path).map_err(|e| Error::from_io(path, e))?;
    }
    Ok(())
}

/// Remove a directory tree, or unlink it when it is a symlink.
///
/// Missing paths are skipped. Returns whether anything was removed.
pub fn remove_dir_or_link(path: &Path, description: &str) -> Result<bool> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("Directory {} doesn't exist; skipping", path.display());
            return Ok(false);
        }
        Err(e) => return Err(Error::from_io(path, e)),
    };

    info!("Removing {}: {}", description, path.display());
    if metadata.file_type().is_symlink() {
        std::fs::remove_file(path).map_err(|e| Error::from_io(path, e))?;
    } else if metadata.is_dir() {
        std::fs::remove_dir_all(path).map_err(|e| Error::from_io(path, e))?;
    } else {
        info!("{} is not a directory; skipping", path.display());
        return Ok(false);
    }
    Ok(true)
}

/// Locate an executable by bare name on `PATH`; paths are returned unchanged
pub fn resolve_executable(path: &Path) -> PathBuf {
    if path.components().count() == 1 && !path.is_absolute() {
        if let Ok(found) = which::which(path) {
            return found;
        }
    }
    path.to_path_buf()
}
