//! Operation context
//!
//! Every operation receives an explicit [`OperationContext`] describing the
//! instance (or relationship) it runs against, the deployment directory where
//! instance working directories live, and the resolver used for template
//! resources bundled with the blueprint.

use crate::error::{Error, Result};
use crate::store::PropertyStore;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// Type name of nodes managed as Terraform modules
pub const MODULE_NODE_TYPE: &str = "tfkit.nodes.Module";

/// Type name of nodes that install the driver
pub const TERRAFORM_NODE_TYPE: &str = "tfkit.nodes.Terraform";

/// Which side of the context an accessor refers to.
///
/// For node-instance contexts every side resolves to the instance itself.
/// For relationship contexts `Current` and `Source` resolve to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Side {
    #[default]
    Current,
    Source,
    Target,
}

/// Static node definition
#[derive(Debug, Clone, Default)]
pub struct NodeHandle {
    pub id: String,
    pub type_hierarchy: Vec<String>,
    pub properties: Map<String, Value>,
}

impl NodeHandle {
    pub fn new(id: impl Into<String>, properties: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            type_hierarchy: Vec::new(),
            properties,
        }
    }

    pub fn with_types(mut self, types: Vec<String>) -> Self {
        self.type_hierarchy = types;
        self
    }

    /// Whether the node derives from `type_name`
    pub fn is_a(&self, type_name: &str) -> bool {
        self.type_hierarchy.iter().any(|t| t == type_name)
    }

    /// Node property, ignoring `null`
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key).filter(|v| !v.is_null())
    }
}

/// A node instance with its runtime property store
#[derive(Clone)]
pub struct InstanceHandle {
    pub id: String,
    pub node: NodeHandle,
    pub runtime: Arc<dyn PropertyStore>,
}

impl InstanceHandle {
    pub fn new(id: impl Into<String>, node: NodeHandle, runtime: Arc<dyn PropertyStore>) -> Self {
        Self {
            id: id.into(),
            node,
            runtime,
        }
    }
}

impl std::fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("id", &self.id)
            .field("node", &self.node.id)
            .finish()
    }
}

/// Resolves template resources shipped with the blueprint
pub trait ResourceResolver: Send + Sync {
    /// Return a local path for a blueprint-relative resource
    fn download_resource(&self, resource_path: &str) -> Result<PathBuf>;
}

/// Resolver backed by a blueprint directory on disk
#[derive(Debug, Clone)]
pub struct DirectoryResolver {
    root: PathBuf,
}

impl DirectoryResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl ResourceResolver for DirectoryResolver {
    fn download_resource(&self, resource_path: &str) -> Result<PathBuf> {
        let path = self.root.join(resource_path);
        if !path.exists() {
            return Err(Error::invalid_config(format!(
                "Blueprint resource '{}' not found under {}",
                resource_path,
                self.root.display()
            )));
        }
        Ok(path)
    }
}

#[derive(Debug, Clone)]
enum Scope {
    NodeInstance(InstanceHandle),
    Relationship {
        source: InstanceHandle,
        target: InstanceHandle,
    },
}

/// Explicit replacement for an ambient "current operation" context
#[derive(Clone)]
pub struct OperationContext {
    scope: Scope,
    operation: String,
    deployment_dir: PathBuf,
    resources: Arc<dyn ResourceResolver>,
}

impl OperationContext {
    /// Context for an operation on a single node instance
    pub fn node_instance(
        instance: InstanceHandle,
        deployment_dir: impl Into<PathBuf>,
        resources: Arc<dyn ResourceResolver>,
    ) -> Self {
        Self {
            scope: Scope::NodeInstance(instance),
            operation: String::new(),
            deployment_dir: deployment_dir.into(),
            resources,
        }
    }

    /// Context for a relationship operation between two instances
    pub fn relationship(
        source: InstanceHandle,
        target: InstanceHandle,
        deployment_dir: impl Into<PathBuf>,
        resources: Arc<dyn ResourceResolver>,
    ) -> Self {
        Self {
            scope: Scope::Relationship { source, target },
            operation: String::new(),
            deployment_dir: deployment_dir.into(),
            resources,
        }
    }

    /// Name the operation (used in log spans)
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    pub fn is_relationship(&self) -> bool {
        matches!(self.scope, Scope::Relationship { .. })
    }

    /// Instance on the given side
    pub fn instance(&self, side: Side) -> &InstanceHandle {
        match (&self.scope, side) {
            (Scope::NodeInstance(instance), _) => instance,
            (Scope::Relationship { target, .. }, Side::Target) => target,
            (Scope::Relationship { source, .. }, _) => source,
        }
    }

    /// Node definition on the given side
    pub fn node(&self, side: Side) -> &NodeHandle {
        &self.instance(side).node
    }

    /// Runtime properties on the given side
    pub fn runtime(&self, side: Side) -> &dyn PropertyStore {
        self.instance(side).runtime.as_ref()
    }

    pub fn deployment_dir(&self) -> &Path {
        &self.deployment_dir
    }

    pub fn resources(&self) -> &dyn ResourceResolver {
        self.resources.as_ref()
    }

    /// Per-instance directory holding binaries, templates and symlinks.
    /// Created on first access.
    pub fn instance_dir(&self, side: Side) -> Result<PathBuf> {
        let dir = self.deployment_dir.join(&self.instance(side).id);
        if !dir.exists() {
            std::fs::create_dir_all(&dir).map_err(|e| Error::from_io(&dir, e))?;
        }
        debug!("Value deployment_dir is {}", dir.display());
        Ok(dir)
    }

    /// Tracing span for the running operation
    pub fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "operation",
            name = %self.operation,
            instance = %self.instance(Side::Current).id
        )
    }
}

impl std::fmt::Debug for OperationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationContext")
            .field("scope", &self.scope)
            .field("operation", &self.operation)
            .field("deployment_dir", &self.deployment_dir)
            .finish()
    }
}
