//! Validate command

use anyhow::{bail, Context, Result};
use camino::Utf8Path;
use serde_json::{Map, Value};
use tfkit_core::types::{ResourceConfig, TerraformConfig};
use tfkit_core::{keys, MODULE_NODE_TYPE};

use crate::host::{Host, NodeSpec};
use crate::output;

/// Parse the `resource_config` and `terraform_config` of one node
fn validate_node(node: &NodeSpec) -> Result<()> {
    let resource_config = node
        .properties
        .get(keys::RESOURCE_CONFIG)
        .cloned()
        .unwrap_or_else(|| Value::Object(Map::new()));
    let config = ResourceConfig::from_value(resource_config)?;

    if node.type_hierarchy.iter().any(|t| t == MODULE_NODE_TYPE) {
        config.require_source()?;
    }

    if let Some(terraform_config) = node.properties.get(keys::TERRAFORM_CONFIG) {
        serde_json::from_value::<TerraformConfig>(terraform_config.clone())
            .context("Invalid terraform_config")?;
    }
    Ok(())
}

pub fn run(config_path: Option<&Utf8Path>) -> Result<()> {
    let host = Host::load(config_path)?;
    output::header(&format!("Validating {}", host.config_path));

    let mut failures = 0;
    for node in &host.file.nodes {
        match validate_node(node) {
            Ok(()) => output::success(&node.id),
            Err(e) => {
                failures += 1;
                output::error(&format!("{}: {:#}", node.id, e));
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} nodes are invalid", failures, host.file.nodes.len());
    }
    output::success("Deployment is valid");
    Ok(())
}
