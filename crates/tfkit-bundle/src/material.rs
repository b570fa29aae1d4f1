//! Source material manager.
//!
//! The bundle (template, generated state and anything else the driver
//! leaves in its working directory) is persisted as text in the
//! `terraform_source` runtime property. A [`Checkout`] materializes it into
//! the storage directory for one driver invocation and [`Checkout::commit`]
//! packs the directory back, whatever the invocation's outcome.

use crate::archive::{pack_directory, unpack_archive};
use crate::encoding::{decode_to_file, encode_file};
use crate::fetch::fetch_source;
use crate::filters::ExclusionSet;
use anyhow::{Context, Result};
use std::future::Future;
use std::path::{Path, PathBuf};
use tfkit_core::resolve;
use tfkit_core::types::{BackendConfig, ResourceConfig, SourceDescriptor};
use tfkit_core::{keys, DriverPaths, Error, OperationContext, PropertyStoreExt, Side};
use tracing::{debug, error, info, warn};

/// Write the backend block into `dir`, returning the generated file
pub fn write_backend_file(dir: &Path, backend: &BackendConfig) -> Result<PathBuf> {
    let path = dir.join(backend.file_name());
    debug!("Writing backend configuration to {}", path.display());
    std::fs::write(&path, backend.render()).map_err(|e| Error::from_io(&path, e))?;
    Ok(path)
}

/// Pack `dir` without `exclusions` and encode the archive as bundle text
pub async fn pack_to_text(dir: PathBuf, exclusions: ExclusionSet) -> Result<String> {
    tokio::task::spawn_blocking(move || {
        let archive = pack_directory(&dir, &exclusions)?;
        let size = std::fs::metadata(&archive)
            .map(|m| m.len())
            .unwrap_or_default();
        info!("Packed {} into a {} byte bundle", dir.display(), size);
        encode_file(&archive)
    })
    .await
    .context("Packing task failed")?
}

/// Decode bundle text and extract it into `target`
pub async fn unpack_text(text: String, target: PathBuf, rebase: Option<PathBuf>) -> Result<()> {
    tokio::task::spawn_blocking(move || {
        let scratch = tempfile::tempdir().context("Failed to create scratch directory")?;
        let archive = decode_to_file(&text, scratch.path())?;
        unpack_archive(&archive, &target, rebase.as_deref())?;
        Ok::<_, anyhow::Error>(())
    })
    .await
    .context("Unpacking task failed")?
}

/// Driver-owned paths that never travel with the bundle
fn driver_exclusions(paths: &DriverPaths) -> ExclusionSet {
    ExclusionSet::new()
        .with(paths.executable.clone())
        .with(paths.plugins_dir.clone())
        .with(paths.data_dir())
}

/// Remove everything under `dir` except excluded paths and their parents.
///
/// Returns the number of entries removed.
fn prune_dir(dir: &Path, exclusions: &ExclusionSet) -> Result<usize> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(Error::from_io(dir, e).into()),
    };

    let mut removed = 0;
    for entry in entries {
        let path = entry.map_err(|e| Error::from_io(dir, e))?.path();
        if exclusions.is_excluded(&path) {
            continue;
        }
        let metadata = std::fs::symlink_metadata(&path).map_err(|e| Error::from_io(&path, e))?;
        if metadata.is_dir() && exclusions.has_excluded_under(&path) {
            removed += prune_dir(&path, exclusions)?;
            continue;
        }
        if metadata.is_dir() {
            std::fs::remove_dir_all(&path).map_err(|e| Error::from_io(&path, e))?;
        } else {
            std::fs::remove_file(&path).map_err(|e| Error::from_io(&path, e))?;
        }
        removed += 1;
    }
    Ok(removed)
}

/// What the body of a checkout gets to work with
#[derive(Debug, Clone)]
pub struct Workspace {
    /// Directory the driver runs in
    pub working_dir: PathBuf,
    pub paths: DriverPaths,
    pub config: ResourceConfig,
}

/// Bundle accessor for one side of an operation context
pub struct SourceMaterial<'a> {
    ctx: &'a OperationContext,
    side: Side,
}

impl<'a> SourceMaterial<'a> {
    pub fn new(ctx: &'a OperationContext, side: Side) -> Self {
        Self { ctx, side }
    }

    /// The persisted bundle text, if any
    pub fn current_bundle(&self) -> Option<String> {
        self.ctx.runtime(self.side).get_string(keys::TERRAFORM_SOURCE)
    }

    /// Location the current bundle was fetched from
    pub fn last_source_location(&self) -> Option<String> {
        self.ctx
            .runtime(self.side)
            .get_string(keys::LAST_SOURCE_LOCATION)
    }

    /// Fetch `source` and persist it as the new bundle
    pub async fn replace_bundle(&self, source: &SourceDescriptor) -> Result<String> {
        let scratch = tempfile::Builder::new()
            .prefix("tfkit-fetch-")
            .tempdir()
            .context("Failed to create scratch directory")?;

        let template_dir = fetch_source(self.ctx, source, scratch.path()).await?;
        let text = pack_to_text(template_dir, ExclusionSet::new()).await?;

        let runtime = self.ctx.runtime(self.side);
        runtime.set_as(keys::TERRAFORM_SOURCE, &text)?;
        runtime.set_as(keys::LAST_SOURCE_LOCATION, &source.location)?;
        runtime.update()?;
        info!("Stored new source bundle from {}", source.location);
        Ok(text)
    }

    /// Forget the persisted bundle and its provenance
    pub fn clear(&self) -> Result<()> {
        let runtime = self.ctx.runtime(self.side);
        runtime.remove(keys::TERRAFORM_SOURCE);
        runtime.remove(keys::LAST_SOURCE_LOCATION);
        runtime.update()?;
        Ok(())
    }

    /// Empty the storage directory, keeping the driver executable, plugins
    /// and data directory
    pub fn clear_working_dir(&self) -> Result<()> {
        let paths = DriverPaths::resolve(self.ctx, self.side)?;
        let removed = prune_dir(&paths.storage_dir, &driver_exclusions(&paths))?;
        debug!(
            "Removed {} entries from {}",
            removed,
            paths.storage_dir.display()
        );
        Ok(())
    }

    /// Reuse the persisted bundle or fetch the configured source
    async fn resolve_bundle(&self, config: &ResourceConfig) -> Result<String> {
        match self.current_bundle() {
            Some(text) => {
                debug!("Reusing persisted source bundle");
                Ok(text)
            }
            None => self.replace_bundle(config.require_source()?).await,
        }
    }

    /// Materialize the bundle in the storage directory.
    ///
    /// The returned checkout must be committed; dropping it without a commit
    /// leaves the persisted bundle untouched.
    pub async fn checkout(&self) -> Result<Checkout<'a>> {
        let config = resolve::resource_config(self.ctx, self.side)?;
        let bundle = self.resolve_bundle(&config).await?;
        let paths = DriverPaths::resolve(self.ctx, self.side)?;
        let working_dir = paths.storage_dir.clone();

        if let Some(backend) = &config.backend {
            write_backend_file(&working_dir, backend)?;
        }

        let rebase = config.source_path.as_ref().map(PathBuf::from);
        unpack_text(bundle, working_dir.clone(), rebase)
            .await
            .with_context(|| format!("Failed to unpack source into {}", working_dir.display()))?;
        debug!("Checked out source into {}", working_dir.display());

        Ok(Checkout {
            ctx: self.ctx,
            side: self.side,
            workspace: Workspace {
                working_dir,
                paths,
                config,
            },
            committed: false,
        })
    }
}

/// A bundle materialized in the storage directory
pub struct Checkout<'a> {
    ctx: &'a OperationContext,
    side: Side,
    workspace: Workspace,
    committed: bool,
}

impl Checkout<'_> {
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn working_dir(&self) -> &Path {
        &self.workspace.working_dir
    }

    /// Paths left out of the repacked bundle
    pub fn exclusions(&self) -> ExclusionSet {
        driver_exclusions(&self.workspace.paths)
    }

    /// Repack the working directory and settle the operation's result.
    ///
    /// A body error always wins over a repack error. A repack error after a
    /// successful body fails the operation.
    pub async fn commit<T>(mut self, outcome: Result<T>) -> Result<T> {
        self.committed = true;
        let repacked = self.repack().await;

        match (outcome, repacked) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => {
                error!(
                    "The driver run succeeded but the source bundle could not be repacked: {:#}",
                    e
                );
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(repack_error)) => {
                error!(
                    "Failed to repack the source bundle after a failed run: {:#}",
                    repack_error
                );
                Err(e)
            }
        }
    }

    async fn repack(&self) -> Result<()> {
        let text = pack_to_text(self.workspace.working_dir.clone(), self.exclusions()).await?;
        let runtime = self.ctx.runtime(self.side);
        runtime.set_as(keys::TERRAFORM_SOURCE, &text)?;
        runtime.set_as(keys::RESOURCE_CONFIG, &self.workspace.config)?;
        runtime.update()?;
        Ok(())
    }
}

impl Drop for Checkout<'_> {
    fn drop(&mut self) {
        if !self.committed {
            warn!(
                "Checkout of {} dropped without commit; the bundle was not repacked",
                self.workspace.working_dir.display()
            );
        }
    }
}

/// Run `body` against a checked out bundle, committing afterwards
pub async fn with_source<F, Fut, T>(ctx: &OperationContext, side: Side, body: F) -> Result<T>
where
    F: FnOnce(Workspace) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let checkout = SourceMaterial::new(ctx, side).checkout().await?;
    let outcome = body(checkout.workspace().clone()).await;
    checkout.commit(outcome).await
}
