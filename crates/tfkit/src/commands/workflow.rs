//! Commands spanning every module instance

use anyhow::Result;
use camino::Utf8Path;
use tfkit_lifecycle::InstanceFilter;

use super::source_descriptor;
use crate::cli::{FilterArgs, ReloadAllArgs};
use crate::host::Host;
use crate::output;

fn instance_filter(args: FilterArgs) -> InstanceFilter {
    InstanceFilter::new(args.node_ids, args.instance_ids)
}

fn report(action: &str, processed: &[String]) {
    if processed.is_empty() {
        output::warning("No module instances matched");
        return;
    }
    for id in processed {
        output::kv(action, id);
    }
    output::success(&format!("{} {} instances", action, processed.len()));
}

pub async fn refresh(args: FilterArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let host = Host::load(config_path)?;
    let contexts = host.contexts("refresh_resources")?;

    let processed = tfkit_lifecycle::refresh_resources(&contexts, &instance_filter(args)).await?;
    report("Refreshed", &processed);
    Ok(())
}

pub async fn reload_all(args: ReloadAllArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let host = Host::load(config_path)?;
    let contexts = host.contexts("reload_resources")?;
    let source = source_descriptor(&args.source);

    let processed = tfkit_lifecycle::reload_resources(
        &contexts,
        &instance_filter(args.filter),
        source.as_ref(),
        args.source.destroy_previous,
    )
    .await?;
    report("Reloaded", &processed);
    Ok(())
}
