//! Module lifecycle commands

use anyhow::Result;
use camino::Utf8Path;

use super::source_descriptor;
use crate::cli::{InstanceArgs, ReloadArgs};
use crate::host::Host;
use crate::output;

pub async fn apply(args: InstanceArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let host = Host::load(config_path)?;
    let ctx = host.context(&args.instance, "apply")?;

    let inventory = tfkit_lifecycle::apply(&ctx).await?;
    output::success(&format!(
        "Applied {} ({} resources)",
        args.instance,
        inventory.len()
    ));
    Ok(())
}

pub async fn destroy(args: InstanceArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let host = Host::load(config_path)?;
    let ctx = host.context(&args.instance, "destroy")?;

    tfkit_lifecycle::destroy(&ctx).await?;
    output::success(&format!("Destroyed resources of {}", args.instance));
    Ok(())
}

pub async fn state_pull(args: InstanceArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let host = Host::load(config_path)?;
    let ctx = host.context(&args.instance, "state_pull")?;

    let inventory = tfkit_lifecycle::state_pull(&ctx).await?;
    output::success(&format!(
        "Refreshed {} ({} resources)",
        args.instance,
        inventory.len()
    ));
    Ok(())
}

pub async fn check_drift(args: InstanceArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let host = Host::load(config_path)?;
    let ctx = host.context(&args.instance, "check_drift")?;

    let report = tfkit_lifecycle::check_drift(&ctx).await?;
    if report.is_drifted {
        output::warning(&format!(
            "{} has {} drifted resources",
            args.instance,
            report.drifts.len()
        ));
        for name in report.drifts.keys() {
            output::kv("Drifted", name);
        }
    } else {
        output::success(&format!("{} matches its template", args.instance));
    }
    Ok(())
}

pub async fn reload(args: ReloadArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let host = Host::load(config_path)?;
    let ctx = host.context(&args.instance, "reload_template")?;

    let inventory = tfkit_lifecycle::reload_template(
        &ctx,
        source_descriptor(&args.source),
        args.source.destroy_previous,
    )
    .await?;
    output::success(&format!(
        "Reloaded {} ({} resources)",
        args.instance,
        inventory.len()
    ));
    Ok(())
}
