//! Workflows over every module instance of a deployment.
//!
//! Instances run one after another; the first failure stops the workflow.

use crate::operations;
use anyhow::{Context, Result};
use tfkit_core::types::SourceDescriptor;
use tfkit_core::{OperationContext, Side, MODULE_NODE_TYPE};
use tracing::info;

/// Restricts a workflow to some nodes or instances; empty lists match all
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceFilter {
    pub node_ids: Vec<String>,
    pub instance_ids: Vec<String>,
}

impl InstanceFilter {
    pub fn new(node_ids: Vec<String>, instance_ids: Vec<String>) -> Self {
        Self {
            node_ids,
            instance_ids,
        }
    }

    /// Whether the context's instance is a selected module
    pub fn matches(&self, ctx: &OperationContext) -> bool {
        let instance = ctx.instance(Side::Current);
        if !self.node_ids.is_empty() && !self.node_ids.contains(&instance.node.id) {
            return false;
        }
        if !self.instance_ids.is_empty() && !self.instance_ids.contains(&instance.id) {
            return false;
        }
        instance.node.is_a(MODULE_NODE_TYPE)
    }
}

/// Selected module contexts, in the given order
pub fn select_modules<'a>(
    contexts: &'a [OperationContext],
    filter: &InstanceFilter,
) -> Vec<&'a OperationContext> {
    contexts.iter().filter(|ctx| filter.matches(ctx)).collect()
}

fn instance_id(ctx: &OperationContext) -> String {
    ctx.instance(Side::Current).id.clone()
}

/// Run `state_pull` on every selected module, returning the instance ids
pub async fn refresh_resources(
    contexts: &[OperationContext],
    filter: &InstanceFilter,
) -> Result<Vec<String>> {
    let mut processed = Vec::new();
    for ctx in select_modules(contexts, filter) {
        let id = instance_id(ctx);
        info!("Adding node instance: {}", id);
        operations::state_pull(ctx)
            .await
            .with_context(|| format!("Refreshing {} failed", id))?;
        processed.push(id);
    }
    Ok(processed)
}

/// Run `reload_template` on every selected module, returning the instance ids
pub async fn reload_resources(
    contexts: &[OperationContext],
    filter: &InstanceFilter,
    source: Option<&SourceDescriptor>,
    destroy_previous: bool,
) -> Result<Vec<String>> {
    let mut processed = Vec::new();
    for ctx in select_modules(contexts, filter) {
        let id = instance_id(ctx);
        info!("Adding node instance: {}", id);
        operations::reload_template(ctx, source.cloned(), destroy_previous)
            .await
            .with_context(|| format!("Reloading {} failed", id))?;
        processed.push(id);
    }
    Ok(processed)
}
