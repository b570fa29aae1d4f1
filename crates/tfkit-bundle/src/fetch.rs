//! Template source retrieval.
//!
//! A source is either an HTTP(S) URL, an absolute local path, or a path
//! relative to the blueprint. Archives are unpacked so the result is always
//! a directory.

use crate::archive::{unpack_any, unpack_archive, ArchiveKind};
use crate::download::{remote_file_name, Credentials, Downloader};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tfkit_core::types::SourceDescriptor;
use tfkit_core::OperationContext;
use tracing::{debug, info};

/// Name of the directory archives are unpacked into inside the scratch area
const UNPACK_DIR: &str = "template";

/// Retrieve `source` and return a directory holding the template.
///
/// Downloads and unpacked archives are placed under `scratch`.
pub async fn fetch_source(
    ctx: &OperationContext,
    source: &SourceDescriptor,
    scratch: &Path,
) -> Result<PathBuf> {
    let local = if source.is_remote() {
        download_source(source, scratch).await?
    } else {
        resolve_local(ctx, &source.location)?
    };

    if local.is_dir() {
        debug!("Template source is directory {}", local.display());
        return Ok(local);
    }

    let target = scratch.join(UNPACK_DIR);
    info!("Unpacking template {} into {}", local.display(), target.display());
    let unpacked = match ArchiveKind::from_path(&local) {
        Some(_) => unpack_any(&local, &target)?,
        // Downloads without a recognizable extension are assumed to be zip
        None if source.is_remote() => unpack_archive(&local, &target, None)?,
        None => unpack_any(&local, &target)?,
    };
    Ok(unpacked)
}

async fn download_source(source: &SourceDescriptor, scratch: &Path) -> Result<PathBuf> {
    let file_name =
        remote_file_name(&source.location).unwrap_or_else(|| "template.zip".to_string());
    let dest = scratch.join(file_name);

    let credentials = source.username.as_ref().map(|username| Credentials {
        username: username.clone(),
        password: source.password.clone(),
    });

    Downloader::new()?
        .download(&source.location, &dest, credentials.as_ref())
        .await
        .with_context(|| format!("Failed to fetch template source {}", source.location))?;
    Ok(dest)
}

fn resolve_local(ctx: &OperationContext, location: &str) -> Result<PathBuf> {
    let path = Path::new(location);
    if path.is_absolute() {
        if !path.exists() {
            return Err(tfkit_core::Error::invalid_config(format!(
                "Template source {} does not exist",
                location
            ))
            .into());
        }
        return Ok(path.to_path_buf());
    }
    debug!("Resolving {} through the blueprint resources", location);
    Ok(ctx.resources().download_resource(location)?)
}
