//! Operations exposed to the host.
//!
//! Driver failures are reported as [`Error::OperationFailed`] with the
//! underlying error as the cause. Configuration errors surface unwrapped.

use anyhow::Result;
use serde_json::Value;
use std::future::Future;
use std::path::{Path, PathBuf};
use tfkit_bundle::{with_source, SourceMaterial};
use tfkit_core::resolve;
use tfkit_core::types::{
    project_drift, project_inventory, DriftReport, ResourceInventory, SourceDescriptor,
};
use tfkit_core::utils::ensure_dir;
use tfkit_core::{keys, Error, OperationContext, PropertyStoreExt, Side};
use tfkit_driver::{InstallPlan, InstallReport, Installer, Terraform, UninstallPlan};
use tracing::{info, Instrument};

/// Check out the bundle, build the driver and run `steps` against it.
///
/// Errors from `steps` are wrapped as `failure`; the bundle is repacked either way.
async fn run_driver<T, F, Fut>(ctx: &OperationContext, failure: &str, steps: F) -> Result<T>
where
    F: FnOnce(Terraform) -> Fut,
    Fut: Future<Output = tfkit_core::Result<T>>,
{
    with_source(ctx, Side::Current, |workspace| async move {
        let terraform = Terraform::from_workspace(&workspace)?;
        steps(terraform)
            .await
            .map_err(|e| anyhow::Error::new(Error::operation_failed(failure, e)))
    })
    .await
}

/// Persist the inventory projected from `state`
fn store_inventory(ctx: &OperationContext, state: &Value) -> Result<ResourceInventory> {
    let inventory = project_inventory(state);
    let runtime = ctx.runtime(Side::Current);
    runtime.set_as(keys::RESOURCES, &inventory)?;
    runtime.remove(keys::STATE);
    runtime.update()?;
    info!("Stored {} resources", inventory.len());
    Ok(inventory)
}

async fn apply_in_place(ctx: &OperationContext) -> Result<ResourceInventory> {
    let state = run_driver(ctx, "Failed applying", |terraform| async move {
        terraform.init(&[]).await?;
        terraform.plan(None).await?;
        terraform.apply().await?;
        terraform.state_pull().await
    })
    .await?;
    store_inventory(ctx, &state)
}

async fn destroy_in_place(ctx: &OperationContext) -> Result<()> {
    run_driver(ctx, "Failed destroying", |terraform| async move {
        terraform.init(&[]).await?;
        terraform.destroy().await
    })
    .await
}

/// `init`, `plan`, `apply` and record the resulting inventory
pub async fn apply(ctx: &OperationContext) -> Result<ResourceInventory> {
    apply_in_place(ctx).instrument(ctx.span()).await
}

/// Refresh and record the current inventory
pub async fn state_pull(ctx: &OperationContext) -> Result<ResourceInventory> {
    async {
        let state = run_driver(ctx, "Failed pulling state", |terraform| async move {
            terraform.init(&[]).await?;
            terraform.refresh().await?;
            terraform.state_pull().await
        })
        .await?;
        store_inventory(ctx, &state)
    }
    .instrument(ctx.span())
    .await
}

pub async fn destroy(ctx: &OperationContext) -> Result<()> {
    destroy_in_place(ctx).instrument(ctx.span()).await
}

/// Plan against the current state and record what would change
pub async fn check_drift(ctx: &OperationContext) -> Result<DriftReport> {
    async {
        let plan = run_driver(ctx, "Failed checking drift", |terraform| async move {
            terraform.init(&[]).await?;
            terraform.plan_and_show().await
        })
        .await?;

        let report = project_drift(&plan);
        let runtime = ctx.runtime(Side::Current);
        runtime.set_as(keys::DRIFTS, &report.drifts)?;
        runtime.set_as(keys::IS_DRIFTED, &report.is_drifted)?;
        runtime.update()?;
        info!(
            "Drift check found {} drifted resources",
            report.drifts.len()
        );
        Ok(report)
    }
    .instrument(ctx.span())
    .await
}

/// Switch the instance to a new template source.
///
/// Without an explicit `source` the configured one is used. With
/// `destroy_previous` the old bundle is destroyed first. Files of the old
/// template are removed from the storage directory before the new one is
/// checked out.
pub async fn reload_template(
    ctx: &OperationContext,
    source: Option<SourceDescriptor>,
    destroy_previous: bool,
) -> Result<ResourceInventory> {
    async {
        let source = match source {
            Some(source) => source,
            None => resolve::resource_config(ctx, Side::Current)?
                .source
                .ok_or_else(|| {
                    Error::invalid_config(
                        "New source path/URL for Terraform template was not provided",
                    )
                })?,
        };

        if destroy_previous {
            info!("Destroying resources of the previous template");
            destroy_in_place(ctx).await?;
        }

        let material = SourceMaterial::new(ctx, Side::Current);
        material.clear()?;
        material.clear_working_dir()?;
        material.replace_bundle(&source).await?;
        apply_in_place(ctx).await
    }
    .instrument(ctx.span())
    .await
}

/// Install the driver and plugins unless an existing driver is used.
///
/// Returns `None` when installation was skipped.
pub async fn install(ctx: &OperationContext) -> Result<Option<InstallReport>> {
    async {
        let config = resolve::resource_config(ctx, Side::Current)?;
        if config.use_existing_resource {
            info!("Using an existing Terraform installation; skipping install");
            return Ok(None);
        }

        let installation_dir = ctx.instance_dir(Side::Current)?;
        let executable = resolve::executable_path(ctx, Side::Current)?;
        let plugins_dir = resolve::plugins_dir(ctx, Side::Current)?;

        let report = Installer::new()?
            .install(&InstallPlan {
                executable: &executable,
                installation_source: config.installation_source.as_deref(),
                plugins: &config.plugins,
                plugins_dir: &plugins_dir,
                installation_dir: &installation_dir,
            })
            .await?;

        let runtime = ctx.runtime(Side::Current);
        runtime.set_as(keys::EXECUTABLE_PATH, &report.executable)?;
        runtime.update()?;
        Ok(Some(report))
    }
    .instrument(ctx.span())
    .await
}

/// Remove the installed driver, plugins and storage directory.
///
/// An existing driver is left in place while the instance's own plugins
/// and storage directories are still removed. Returns whether the driver
/// executable was removed.
pub async fn uninstall(ctx: &OperationContext) -> Result<bool> {
    async {
        let config = resolve::resource_config(ctx, Side::Current)?;
        let executable = resolve::executable_path(ctx, Side::Current)?;
        let plugins_dir = resolve::plugins_dir(ctx, Side::Current)?;
        let storage_dir = resolve::storage_path(ctx, Side::Current)?;

        Installer::new()?.uninstall(&UninstallPlan {
            executable: &executable,
            external: config.use_existing_resource,
            plugins_dir: &plugins_dir,
            storage_dir: &storage_dir,
        })?;
        Ok(!config.use_existing_resource)
    }
    .instrument(ctx.span())
    .await
}

/// Move `path` from under `target_dir` to the same place under `source_dir`
fn rebase_on_source(path: &Path, target_dir: &Path, source_dir: &Path) -> PathBuf {
    match path.strip_prefix(target_dir) {
        Ok(relative) => source_dir.join(relative),
        Err(_) => path.to_path_buf(),
    }
}

/// Point a dependent instance at the driver installed by its target.
///
/// The source gets the target's executable and its own storage and plugins
/// paths. Unless the target uses an existing driver, the source's driver data
/// directory is a symlink to the target's so plugins are stored once.
pub async fn set_directory_config(ctx: &OperationContext) -> Result<()> {
    let _entered = ctx.span().entered();
    if !ctx.is_relationship() {
        return Err(Error::invalid_config(
            "set_directory_config must run on a relationship between a module and its driver",
        )
        .into());
    }

    let executable = resolve::executable_path(ctx, Side::Target)?;
    let target_plugins = resolve::plugins_dir(ctx, Side::Target)?;
    let target_storage = resolve::storage_path(ctx, Side::Target)?;
    let target_data_dir = target_storage.join(resolve::TERRAFORM_DATA_DIR);

    let source_dir = ctx.instance_dir(Side::Source)?;
    let source_data_dir = source_dir.join(resolve::TERRAFORM_DATA_DIR);

    let target_dir = ctx.instance_dir(Side::Target)?;
    let plugins_dir = rebase_on_source(&target_plugins, &target_dir, &source_dir);
    let storage_dir = rebase_on_source(&target_storage, &target_dir, &source_dir);

    if resolve::is_using_existing(ctx, Side::Target)? {
        ensure_dir(&source_data_dir)?;
    } else {
        ensure_dir(&target_data_dir)?;
        link_data_dir(&target_data_dir, &source_data_dir)?;
    }

    info!("setting executable_path to {}", executable.display());
    info!("setting plugins_dir to {}", plugins_dir.display());
    info!("setting storage_path to {}", storage_dir.display());
    let runtime = ctx.runtime(Side::Source);
    runtime.set_as(keys::EXECUTABLE_PATH, &executable)?;
    runtime.set_as(keys::PLUGINS_DIR, &plugins_dir)?;
    runtime.set_as(keys::STORAGE_PATH, &storage_dir)?;
    runtime.update()?;
    Ok(())
}

/// Symlink `link` to `original`; an existing link to the same place is kept
fn link_data_dir(original: &Path, link: &Path) -> Result<()> {
    if let Ok(existing) = std::fs::read_link(link) {
        if existing == original {
            info!("Link {} already points to {}", link.display(), original.display());
            return Ok(());
        }
    }

    info!("Creating link {} {}", original.display(), link.display());
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(original, link).map_err(|e| Error::from_io(link, e))?;
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_dir(original, link).map_err(|e| Error::from_io(link, e))?;
    }
    Ok(())
}
