//! Driver and plugin installation.
//!
//! Installing is idempotent for the executable: an existing file at the
//! target path is never downloaded again. Plugins are always (re)installed
//! into `<plugins_dir>/<name>`, in name order.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tfkit_bundle::{list_entries, unpack_archive, Downloader};
use tfkit_core::types::MISSING_INSTALLATION_SOURCE;
use tfkit_core::utils::{ensure_dir, remove_dir_or_link};
use tfkit_core::Error;
use tracing::{debug, info, warn};

/// What to install and where
#[derive(Debug, Clone)]
pub struct InstallPlan<'a> {
    /// Target executable path
    pub executable: &'a Path,

    /// URL or local path of the driver archive
    pub installation_source: Option<&'a str>,

    /// Plugin name -> URL or local path of its archive
    pub plugins: &'a BTreeMap<String, String>,

    pub plugins_dir: &'a Path,

    /// Scratch location for downloaded archives
    pub installation_dir: &'a Path,
}

/// Outcome of [`Installer::install`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub executable: PathBuf,

    /// False when an executable was already present
    pub downloaded_executable: bool,

    pub plugins_installed: Vec<String>,
}

/// What to remove
#[derive(Debug, Clone)]
pub struct UninstallPlan<'a> {
    pub executable: &'a Path,

    /// The executable was provided outside tfkit and must be kept
    pub external: bool,

    pub plugins_dir: &'a Path,
    pub storage_dir: &'a Path,
}

/// Installs the driver executable and its plugins
#[derive(Debug, Clone)]
pub struct Installer {
    downloader: Downloader,
}

impl Installer {
    pub fn new() -> Result<Self> {
        Ok(Self {
            downloader: Downloader::new()?,
        })
    }

    /// Show download progress bars
    pub fn with_progress(mut self, show: bool) -> Self {
        self.downloader = self.downloader.with_progress(show);
        self
    }

    pub async fn install(&self, plan: &InstallPlan<'_>) -> Result<InstallReport> {
        let downloaded_executable = self.install_executable(plan).await?;
        let plugins_installed = self.install_plugins(plan).await?;

        Ok(InstallReport {
            executable: plan.executable.to_path_buf(),
            downloaded_executable,
            plugins_installed,
        })
    }

    async fn install_executable(&self, plan: &InstallPlan<'_>) -> Result<bool> {
        let executable = plan.executable;
        if executable.is_file() {
            info!(
                "Terraform executable already exists at {}; skipping download",
                executable.display()
            );
            return Ok(false);
        }

        let source = plan
            .installation_source
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::invalid_config(MISSING_INSTALLATION_SOURCE))?;
        warn!(
            "Installing Terraform to {}; make sure the directory is writable",
            executable.display()
        );

        let target_dir = executable
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        ensure_dir(&target_dir)?;

        let archive = self.fetch_archive(source, plan.installation_dir).await?;
        extract_executables(archive, target_dir).await?;

        if !executable.is_file() {
            return Err(Error::invalid_config(format!(
                "The archive from {} did not contain {}",
                source,
                executable.display()
            ))
            .into());
        }
        info!("Installed Terraform at {}", executable.display());
        Ok(true)
    }

    async fn install_plugins(&self, plan: &InstallPlan<'_>) -> Result<Vec<String>> {
        ensure_dir(plan.plugins_dir)?;

        let mut installed = Vec::with_capacity(plan.plugins.len());
        for (name, source) in plan.plugins {
            let target = plan.plugins_dir.join(name);
            info!("Installing plugin {} from {} into {}", name, source, target.display());
            ensure_dir(&target)?;

            let archive = self.fetch_archive(source, plan.installation_dir).await?;
            extract_executables(archive, target)
                .await
                .with_context(|| format!("Failed to install plugin {}", name))?;
            installed.push(name.clone());
        }
        Ok(installed)
    }

    /// Copy or download `source` into a scratch archive under `scratch_dir`
    async fn fetch_archive(&self, source: &str, scratch_dir: &Path) -> Result<TempPath> {
        ensure_dir(scratch_dir)?;
        let archive = tempfile::Builder::new()
            .prefix("tfkit-download-")
            .suffix(".zip")
            .tempfile_in(scratch_dir)
            .map_err(|e| Error::from_io(scratch_dir, e))?
            .into_temp_path();

        if is_url(source) {
            self.downloader.download(source, &archive, None).await?;
        } else {
            debug!("Copying local archive {}", source);
            tokio::fs::copy(source, &archive)
                .await
                .with_context(|| format!("Failed to read archive {}", source))?;
        }
        Ok(archive)
    }

    /// Remove what [`Installer::install`] and the checkouts created
    pub fn uninstall(&self, plan: &UninstallPlan<'_>) -> Result<()> {
        if plan.external {
            info!(
                "Keeping externally provided executable {}",
                plan.executable.display()
            );
        } else if plan.executable.is_file() {
            info!("Removing executable: {}", plan.executable.display());
            std::fs::remove_file(plan.executable)
                .map_err(|e| Error::from_io(plan.executable, e))?;
        } else {
            info!(
                "Executable {} doesn't exist; skipping",
                plan.executable.display()
            );
        }

        remove_dir_or_link(plan.plugins_dir, "plugins directory")?;
        remove_dir_or_link(plan.storage_dir, "storage directory")?;
        Ok(())
    }
}

fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Unpack `archive` into `target` and mark every extracted file executable
async fn extract_executables(archive: TempPath, target: PathBuf) -> Result<Vec<PathBuf>> {
    tokio::task::spawn_blocking(move || {
        unpack_archive(&archive, &target, None)?;
        let entries: Vec<PathBuf> = list_entries(&archive)?
            .into_iter()
            .map(|entry| target.join(entry))
            .collect();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            for path in &entries {
                let mut perms = std::fs::metadata(path)
                    .map_err(|e| Error::from_io(path, e))?
                    .permissions();
                perms.set_mode(perms.mode() | 0o100);
                std::fs::set_permissions(path, perms).map_err(|e| Error::from_io(path, e))?;
            }
        }

        // Dropping the temp path removes the scratch archive
        drop(archive);
        Ok::<_, anyhow::Error>(entries)
    })
    .await
    .context("Extraction task failed")?
}
