//! Configuration resolution
//!
//! Values are looked up instance-first, then on the node, then computed from
//! the instance directory. Resolved driver paths are cached back into the
//! instance's runtime properties so later operations reuse them.

use crate::context::{OperationContext, Side};
use crate::error::{Error, Result};
use crate::store::{keys, PropertyStoreExt};
use crate::types::{ResourceConfig, TerraformConfig};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default executable name inside the instance directory
pub const DEFAULT_EXECUTABLE_NAME: &str = "terraform";

/// Driver working data directory inside the storage directory
pub const TERRAFORM_DATA_DIR: &str = ".terraform";

/// Default plugins directory, relative to the storage directory
pub const DEFAULT_PLUGINS_SUBDIR: &str = ".terraform/plugins";

fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Object(map) => !map.is_empty(),
        Value::String(s) => !s.is_empty(),
        _ => true,
    }
}

fn lookup(ctx: &OperationContext, side: Side, key: &str) -> Value {
    let instance = ctx.instance(side);
    instance
        .runtime
        .get(key)
        .filter(is_set)
        .or_else(|| instance.node.property(key).cloned())
        .unwrap_or_else(|| Value::Object(Map::new()))
}

/// `resource_config` from runtime properties, falling back to the node
pub fn resource_config(ctx: &OperationContext, side: Side) -> Result<ResourceConfig> {
    ResourceConfig::from_value(lookup(ctx, side, keys::RESOURCE_CONFIG))
}

/// `terraform_config` from runtime properties, falling back to the node
pub fn terraform_config(ctx: &OperationContext, side: Side) -> Result<TerraformConfig> {
    serde_json::from_value(lookup(ctx, side, keys::TERRAFORM_CONFIG))
        .map_err(|e| Error::invalid_config(format!("terraform_config: {}", e)))
}

/// Whether the driver was provided outside tfkit
pub fn is_using_existing(ctx: &OperationContext, side: Side) -> Result<bool> {
    Ok(resource_config(ctx, side)?.use_existing_resource)
}

/// The driver executable.
///
/// Either configured explicitly (e.g. `/usr/bin/terraform` for an existing
/// resource) or `<instance_dir>/terraform`.
pub fn executable_path(ctx: &OperationContext, side: Side) -> Result<PathBuf> {
    let runtime = ctx.runtime(side);
    let path = match runtime.get_string(keys::EXECUTABLE_PATH) {
        Some(path) => PathBuf::from(path),
        None => match terraform_config(ctx, side)?
            .executable_path
            .filter(|p| !p.is_empty())
        {
            Some(path) => PathBuf::from(path),
            None => ctx.instance_dir(side)?.join(DEFAULT_EXECUTABLE_NAME),
        },
    };
    runtime.set_as(keys::EXECUTABLE_PATH, &path)?;
    debug!("Value executable_path is {}", path.display());
    Ok(path)
}

/// Working directory of the driver; always the instance directory
pub fn storage_path(ctx: &OperationContext, side: Side) -> Result<PathBuf> {
    let instance_dir = ctx.instance_dir(side)?;

    if let Some(requested) = resource_config(ctx, side)?
        .storage_path
        .filter(|p| !p.is_empty())
    {
        if Path::new(&requested) != instance_dir {
            return Err(Error::UnsupportedStoragePath { path: requested });
        }
    }

    let runtime = ctx.runtime(side);
    let storage = runtime
        .get_string(keys::STORAGE_PATH)
        .map(PathBuf::from)
        .unwrap_or(instance_dir);
    runtime.set_as(keys::STORAGE_PATH, &storage)?;
    debug!("Value storage_path is {}", storage.display());
    Ok(storage)
}

/// Directory plugins are installed into; must sit under the storage path
pub fn plugins_dir(ctx: &OperationContext, side: Side) -> Result<PathBuf> {
    let storage = storage_path(ctx, side)?;
    let runtime = ctx.runtime(side);

    let configured = match runtime.get_string(keys::PLUGINS_DIR) {
        Some(dir) => Some(dir),
        None => resource_config(ctx, side)?
            .plugins_dir
            .or(terraform_config(ctx, side)?.plugins_dir)
            .filter(|d| !d.is_empty()),
    };
    let plugins_dir = configured
        .map(PathBuf::from)
        .unwrap_or_else(|| storage.join(DEFAULT_PLUGINS_SUBDIR));

    if !plugins_dir.starts_with(&storage) {
        return Err(Error::invalid_config(format!(
            "Terraform plugins directory {} must be a subdirectory of the storage_path {}",
            plugins_dir.display(),
            storage.display()
        )));
    }

    runtime.set_as(keys::PLUGINS_DIR, &plugins_dir)?;
    debug!("Value plugins_dir is {}", plugins_dir.display());
    Ok(plugins_dir)
}

/// The three driver paths every checkout needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverPaths {
    pub executable: PathBuf,
    pub storage_dir: PathBuf,
    pub plugins_dir: PathBuf,
}

impl DriverPaths {
    pub fn resolve(ctx: &OperationContext, side: Side) -> Result<Self> {
        Ok(Self {
            executable: executable_path(ctx, side)?,
            storage_dir: storage_path(ctx, side)?,
            plugins_dir: plugins_dir(ctx, side)?,
        })
    }

    /// The driver's data directory inside the storage directory
    pub fn data_dir(&self) -> PathBuf {
        self.storage_dir.join(TERRAFORM_DATA_DIR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{DirectoryResolver, InstanceHandle, NodeHandle};
    use crate::store::{MemoryStore, PropertyStore};
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn context(deploy: &Path, node_props: Value, runtime: Value) -> OperationContext {
        let store = MemoryStore::with_values(runtime.as_object().cloned().unwrap_or_default());
        let node = NodeHandle::new("module", node_props.as_object().cloned().unwrap_or_default());
        OperationContext::node_instance(
            InstanceHandle::new("module_1", node, Arc::new(store)),
            deploy,
            Arc::new(DirectoryResolver::new(deploy)),
        )
    }

    #[test]
    fn test_runtime_resource_config_wins() {
        let deploy = TempDir::new().unwrap();
        let ctx = context(
            deploy.path(),
            json!({"resource_config": {"source": "node/template"}}),
            json!({"resource_config": {"source": "runtime/template"}}),
        );
        let config = resource_config(&ctx, Side::Current).unwrap();
        assert_eq!(config.source.unwrap().location, "runtime/template");
    }

    #[test]
    fn test_empty_runtime_resource_config_falls_back() {
        let deploy = TempDir::new().unwrap();
        let ctx = context(
            deploy.path(),
            json!({"resource_config": {"source": "node/template"}}),
            json!({"resource_config": {}}),
        );
        let config = resource_config(&ctx, Side::Current).unwrap();
        assert_eq!(config.source.unwrap().location, "node/template");
    }

    #[test]
    fn test_default_paths_are_memoized() {
        let deploy = TempDir::new().unwrap();
        let ctx = context(deploy.path(), json!({}), json!({}));

        let paths = DriverPaths::resolve(&ctx, Side::Current).unwrap();
        let instance_dir = deploy.path().join("module_1");
        assert_eq!(paths.executable, instance_dir.join("terraform"));
        assert_eq!(paths.storage_dir, instance_dir);
        assert_eq!(paths.plugins_dir, instance_dir.join(".terraform/plugins"));
        assert_eq!(paths.data_dir(), instance_dir.join(".terraform"));

        let runtime = ctx.runtime(Side::Current);
        assert_eq!(
            runtime.get(keys::EXECUTABLE_PATH),
            Some(json!(instance_dir.join("terraform")))
        );
        assert!(runtime.get(keys::STORAGE_PATH).is_some());
        assert!(runtime.get(keys::PLUGINS_DIR).is_some());
    }

    #[test]
    fn test_executable_from_node_terraform_config() {
        let deploy = TempDir::new().unwrap();
        let ctx = context(
            deploy.path(),
            json!({"terraform_config": {"executable_path": "/usr/bin/terraform"}}),
            json!({}),
        );
        assert_eq!(
            executable_path(&ctx, Side::Current).unwrap(),
            PathBuf::from("/usr/bin/terraform")
        );
    }

    #[test]
    fn test_storage_path_override_rejected() {
        let deploy = TempDir::new().unwrap();
        let ctx = context(
            deploy.path(),
            json!({"resource_config": {"storage_path": "/somewhere/else"}}),
            json!({}),
        );
        let err = storage_path(&ctx, Side::Current).unwrap_err();
        assert!(matches!(err, Error::UnsupportedStoragePath { .. }));
    }

    #[test]
    fn test_plugins_dir_outside_storage_rejected() {
        let deploy = TempDir::new().unwrap();
        let ctx = context(
            deploy.path(),
            json!({"terraform_config": {"plugins_dir": "/tmp/plugins"}}),
            json!({}),
        );
        let err = plugins_dir(&ctx, Side::Current).unwrap_err();
        assert!(err.to_string().contains("must be a subdirectory"));
    }

    #[test]
    fn test_use_existing_defaults_to_true() {
        let deploy = TempDir::new().unwrap();
        let ctx = context(deploy.path(), json!({}), json!({}));
        assert!(is_using_existing(&ctx, Side::Current).unwrap());
    }
}
