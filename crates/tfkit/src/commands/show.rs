//! Show recorded resources and drift of an instance

use anyhow::Result;
use camino::Utf8Path;
use serde::Serialize;
use serde_json::{Map, Value};
use tabled::{settings::Style, Table, Tabled};
use tfkit_core::types::ResourceInventory;
use tfkit_core::{keys, PropertyStoreExt};

use crate::cli::ShowArgs;
use crate::host::Host;
use crate::output;

#[derive(Tabled)]
struct ResourceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Type")]
    kind: String,
    #[tabled(rename = "Drift")]
    drift: String,
}

#[derive(Serialize)]
struct ShowJson {
    instance: String,
    resources: ResourceInventory,
    is_drifted: bool,
    drifts: Map<String, Value>,
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or("-")
        .to_string()
}

/// Drift actions joined for display, e.g. `delete,create`
fn drift_actions(change: Option<&Value>) -> String {
    change
        .and_then(|c| c.get("actions"))
        .and_then(Value::as_array)
        .map(|actions| {
            actions
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join(",")
        })
        .unwrap_or_default()
}

fn rows(resources: &ResourceInventory, drifts: &Map<String, Value>) -> Vec<ResourceRow> {
    let mut rows: Vec<ResourceRow> = resources
        .iter()
        .map(|(name, resource)| ResourceRow {
            name: name.clone(),
            kind: string_field(resource, "type"),
            drift: drift_actions(drifts.get(name)),
        })
        .collect();

    // Drifted resources that are not in state yet
    for (name, change) in drifts {
        if !resources.contains_key(name) {
            rows.push(ResourceRow {
                name: name.clone(),
                kind: "-".to_string(),
                drift: drift_actions(Some(change)),
            });
        }
    }
    rows
}

pub fn run(args: ShowArgs, config_path: Option<&Utf8Path>) -> Result<()> {
    let host = Host::load(config_path)?;
    let instance = host.instance(&args.instance)?;
    let runtime = instance.runtime.as_ref();

    let resources: ResourceInventory = runtime.get_as(keys::RESOURCES)?.unwrap_or_default();
    let drifts: Map<String, Value> = runtime.get_as(keys::DRIFTS)?.unwrap_or_default();
    let is_drifted = runtime.get_as(keys::IS_DRIFTED)?.unwrap_or(false);

    if args.json {
        let json = ShowJson {
            instance: args.instance,
            resources,
            is_drifted,
            drifts,
        };
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    output::header(&format!("Instance: {}", args.instance));
    output::kv("Node", &instance.node.id);
    output::kv(
        "Properties",
        &host.properties_path(&args.instance).display().to_string(),
    );
    for key in [keys::EXECUTABLE_PATH, keys::LAST_SOURCE_LOCATION] {
        if let Some(value) = runtime.get_string(key) {
            output::kv(key, &value);
        }
    }

    let rows = rows(&resources, &drifts);
    if rows.is_empty() {
        output::info("No resources recorded");
    } else {
        let mut table = Table::new(rows);
        table.with(Style::sharp());
        println!("{}", table);
    }

    if is_drifted {
        output::warning(&format!("{} resources drifted", drifts.len()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rows_include_drift_for_missing_resources() {
        let resources = json!({"vpc": {"type": "aws_vpc"}})
            .as_object()
            .cloned()
            .unwrap();
        let drifts = json!({
            "vpc": {"actions": ["update"]},
            "subnet": {"actions": ["create"]}
        })
        .as_object()
        .cloned()
        .unwrap();

        let rows = rows(&resources, &drifts);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "vpc");
        assert_eq!(rows[0].kind, "aws_vpc");
        assert_eq!(rows[0].drift, "update");
        assert_eq!(rows[1].name, "subnet");
        assert_eq!(rows[1].kind, "-");
        assert_eq!(rows[1].drift, "create");
    }
}
