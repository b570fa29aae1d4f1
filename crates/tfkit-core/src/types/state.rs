//! Projection of driver state and plan JSON
//!
//! Both projections are best-effort: unexpected shapes degrade to empty
//! mappings instead of failing the operation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Actions that never count as drift
const NON_DRIFT_ACTIONS: &[&str] = &["no-op", "read"];

/// Resource name -> driver resource definition
pub type ResourceInventory = Map<String, Value>;

/// Result of projecting a plan
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub is_drifted: bool,

    /// Resource name -> change object (`actions`, `before`, `after`, ...)
    pub drifts: Map<String, Value>,
}

/// Flatten `resources[*]` and legacy `modules[*].resources{}` into one map.
///
/// Later entries win on name collisions, so module resources overwrite
/// top-level ones with the same name.
pub fn project_inventory(state: &Value) -> ResourceInventory {
    let mut inventory = Map::new();

    if let Some(resources) = state.get("resources").and_then(Value::as_array) {
        for resource in resources {
            if let Some(name) = resource.get("name").and_then(Value::as_str) {
                inventory.insert(name.to_string(), resource.clone());
            }
        }
    }

    if let Some(modules) = state.get("modules").and_then(Value::as_array) {
        for module in modules {
            if let Some(resources) = module.get("resources").and_then(Value::as_object) {
                for (name, definition) in resources {
                    inventory.insert(name.clone(), definition.clone());
                }
            }
        }
    }

    inventory
}

/// Collect every `resource_changes[*]` whose actions are not a pure
/// `["no-op"]` or `["read"]`.
pub fn project_drift(plan: &Value) -> DriftReport {
    let mut report = DriftReport::default();

    let Some(changes) = plan.get("resource_changes").and_then(Value::as_array) else {
        return report;
    };

    for resource_change in changes {
        let Some(change) = resource_change.get("change") else {
            continue;
        };
        if !is_drift(change) {
            continue;
        }
        report.is_drifted = true;
        if let Some(name) = resource_change.get("name").and_then(Value::as_str) {
            report.drifts.insert(name.to_string(), change.clone());
        }
    }

    report
}

fn is_drift(change: &Value) -> bool {
    let actions: Vec<&str> = change
        .get("actions")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    !matches!(actions.as_slice(), [single] if NON_DRIFT_ACTIONS.contains(single))
}
