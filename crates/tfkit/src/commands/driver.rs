//! Driver installation commands

use anyhow::Result;
use camino::Utf8Path;
use tfkit_core::{keys, PropertyStoreExt, Side};

use crate::cli::{InstanceArgs, LinkArgs};
use crate::host::Host;
use crate::output;

pub async fn install(args: InstanceArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let host = Host::load(config_path)?;
    let ctx = host.context(&args.instance, "install")?;
    tracing::debug!("Installing under {}", host.deployment_dir().display());

    match tfkit_lifecycle::install(&ctx).await? {
        Some(report) => {
            if report.downloaded_executable {
                output::success(&format!("Installed {}", report.executable.display()));
            } else {
                output::info(&format!(
                    "Terraform already present at {}",
                    report.executable.display()
                ));
            }
            for plugin in &report.plugins_installed {
                output::kv("Plugin", plugin);
            }
        }
        None => output::info("Using an existing Terraform installation"),
    }
    Ok(())
}

pub async fn uninstall(args: InstanceArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let host = Host::load(config_path)?;
    let ctx = host.context(&args.instance, "uninstall")?;

    if tfkit_lifecycle::uninstall(&ctx).await? {
        output::success(&format!("Uninstalled Terraform from {}", args.instance));
    } else {
        output::info("Existing Terraform installation left in place");
    }
    Ok(())
}

pub async fn link(args: LinkArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let host = Host::load(config_path)?;
    let ctx = host.relationship(&args.source, &args.target)?;

    tfkit_lifecycle::set_directory_config(&ctx).await?;

    let runtime = ctx.runtime(Side::Source);
    output::success(&format!("Linked {} to {}", args.source, args.target));
    for key in [keys::EXECUTABLE_PATH, keys::PLUGINS_DIR, keys::STORAGE_PATH] {
        if let Some(value) = runtime.get_string(key) {
            output::kv(key, &value);
        }
    }
    Ok(())
}
