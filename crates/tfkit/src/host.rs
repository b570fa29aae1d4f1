//! Deployment host
//!
//! Stands in for an orchestrator: nodes and instances come from a YAML
//! deployment file and each instance's runtime properties live in
//! `<deployment_dir>/.tfkit/<instance>.json`.

use anyhow::{anyhow, bail, Context, Result};
use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tfkit_core::utils::default_deployment_dir;
use tfkit_core::{
    DirectoryResolver, InstanceHandle, JsonFileStore, NodeHandle, OperationContext,
    ResourceResolver,
};
use tracing::debug;

/// Deployment file names looked up in the working directory
const DEFAULT_CONFIG_FILES: &[&str] = &["tfkit.yaml", "tfkit.yml"];

/// Directory inside the deployment directory holding runtime properties
const STATE_DIR: &str = ".tfkit";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentFile {
    pub deployment: String,

    #[serde(default)]
    pub deployment_dir: Option<Utf8PathBuf>,

    /// Root for blueprint-relative template sources; the file's directory by default
    #[serde(default)]
    pub blueprint_dir: Option<Utf8PathBuf>,

    #[serde(default)]
    pub nodes: Vec<NodeSpec>,

    #[serde(default)]
    pub relationships: Vec<RelationshipSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeSpec {
    pub id: String,

    #[serde(default)]
    pub type_hierarchy: Vec<String>,

    #[serde(default)]
    pub properties: Map<String, Value>,

    /// Instance ids; `<id>_1` when empty
    #[serde(default)]
    pub instances: Vec<String>,
}

impl NodeSpec {
    pub fn instance_ids(&self) -> Vec<String> {
        if self.instances.is_empty() {
            vec![format!("{}_1", self.id)]
        } else {
            self.instances.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipSpec {
    pub source: String,
    pub target: String,
}

/// A loaded deployment
#[derive(Clone)]
pub struct Host {
    pub file: DeploymentFile,
    pub config_path: Utf8PathBuf,
    deployment_dir: PathBuf,
    resources: Arc<dyn ResourceResolver>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("config_path", &self.config_path)
            .field("deployment_dir", &self.deployment_dir)
            .finish()
    }
}

/// Find the deployment file: explicit path first, then the defaults
pub fn find_config(explicit: Option<&Utf8Path>) -> Result<Utf8PathBuf> {
    if let Some(path) = explicit {
        return Ok(path.to_path_buf());
    }
    DEFAULT_CONFIG_FILES
        .iter()
        .map(Utf8PathBuf::from)
        .find(|path| path.is_file())
        .ok_or_else(|| {
            anyhow!(
                "No deployment file found. Create tfkit.yaml or pass --config <path> (or set TFKIT_CONFIG)"
            )
        })
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path)
        .with_context(|| format!("Failed to resolve {} to an absolute path", path.display()))
}

impl Host {
    pub fn load(explicit: Option<&Utf8Path>) -> Result<Self> {
        let config_path = find_config(explicit)?;
        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path))?;
        let file: DeploymentFile = serde_yaml_ng::from_str(&content)
            .with_context(|| format!("Failed to parse {}", config_path))?;
        Self::from_file(file, config_path)
    }

    pub fn from_file(file: DeploymentFile, config_path: Utf8PathBuf) -> Result<Self> {
        let base = config_path
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from("."));

        // The driver runs inside instance directories, so every path it is
        // handed must be absolute
        let deployment_dir = match &file.deployment_dir {
            Some(dir) => absolute(base.join(dir).as_std_path())?,
            None => absolute(&default_deployment_dir(&file.deployment))?,
        };
        let blueprint_dir = match &file.blueprint_dir {
            Some(dir) => absolute(base.join(dir).as_std_path())?,
            None => absolute(base.as_std_path())?,
        };
        debug!(
            "Deployment {} in {} with blueprint {}",
            file.deployment,
            deployment_dir.display(),
            blueprint_dir.display()
        );

        let host = Self {
            file,
            config_path,
            deployment_dir,
            resources: Arc::new(DirectoryResolver::new(blueprint_dir)),
        };
        host.validate_layout()?;
        Ok(host)
    }

    /// Instance ids must be unique and relationships must name known instances
    fn validate_layout(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for node in &self.file.nodes {
            for id in node.instance_ids() {
                if !seen.insert(id.clone()) {
                    bail!("Instance id '{}' is declared more than once", id);
                }
            }
        }
        for relationship in &self.file.relationships {
            for id in [&relationship.source, &relationship.target] {
                if !seen.contains(id) {
                    bail!("Relationship refers to unknown instance '{}'", id);
                }
            }
        }
        Ok(())
    }

    pub fn deployment_dir(&self) -> &std::path::Path {
        &self.deployment_dir
    }

    /// File holding the runtime properties of `instance_id`
    pub fn properties_path(&self, instance_id: &str) -> PathBuf {
        self.deployment_dir
            .join(STATE_DIR)
            .join(format!("{}.json", instance_id))
    }

    fn node_of(&self, instance_id: &str) -> Result<&NodeSpec> {
        self.file
            .nodes
            .iter()
            .find(|node| node.instance_ids().iter().any(|id| id == instance_id))
            .ok_or_else(|| anyhow!("Unknown instance '{}'", instance_id))
    }

    pub fn instance(&self, instance_id: &str) -> Result<InstanceHandle> {
        let definition = self.node_of(instance_id)?;
        let node = NodeHandle::new(&definition.id, definition.properties.clone())
            .with_types(definition.type_hierarchy.clone());
        let store = JsonFileStore::open(self.properties_path(instance_id))
            .with_context(|| format!("Failed to load runtime properties of {}", instance_id))?;
        Ok(InstanceHandle::new(instance_id, node, Arc::new(store)))
    }

    pub fn context(&self, instance_id: &str, operation: &str) -> Result<OperationContext> {
        Ok(OperationContext::node_instance(
            self.instance(instance_id)?,
            &self.deployment_dir,
            Arc::clone(&self.resources),
        )
        .with_operation(operation))
    }

    pub fn relationship(&self, source: &str, target: &str) -> Result<OperationContext> {
        Ok(OperationContext::relationship(
            self.instance(source)?,
            self.instance(target)?,
            &self.deployment_dir,
            Arc::clone(&self.resources),
        )
        .with_operation("set_directory_config"))
    }

    /// Contexts for every instance, in declaration order
    pub fn contexts(&self, operation: &str) -> Result<Vec<OperationContext>> {
        self.file
            .nodes
            .iter()
            .flat_map(NodeSpec::instance_ids)
            .map(|id| self.context(&id, operation))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tfkit_core::{PropertyStoreExt, Side, MODULE_NODE_TYPE};

    const DEPLOYMENT: &str = r#"
deployment: demo
deployment_dir: state
nodes:
  - id: terraform
    type_hierarchy: [tfkit.nodes.Terraform]
    properties:
      resource_config:
        use_existing_resource: false
        installation_source: https://releases.example.com/terraform.zip
  - id: vpc
    type_hierarchy: [tfkit.nodes.Module]
    properties:
      resource_config:
        source: templates/vpc
    instances: [vpc_a, vpc_b]
relationships:
  - { source: vpc_a, target: terraform_1 }
"#;

    fn host(dir: &TempDir, content: &str) -> Result<Host> {
        let path = Utf8PathBuf::from_path_buf(dir.path().join("tfkit.yaml")).unwrap();
        std::fs::write(&path, content).unwrap();
        Host::load(Some(&path))
    }

    #[test]
    fn test_load_resolves_paths_relative_to_file() {
        let dir = TempDir::new().unwrap();
        let host = host(&dir, DEPLOYMENT).unwrap();

        assert_eq!(host.deployment_dir(), dir.path().join("state"));
        assert_eq!(
            host.properties_path("vpc_a"),
            dir.path().join("state/.tfkit/vpc_a.json")
        );
        let ids: Vec<String> = host
            .contexts("refresh")
            .unwrap()
            .iter()
            .map(|ctx| ctx.instance(Side::Current).id.clone())
            .collect();
        assert_eq!(ids, vec!["terraform_1", "vpc_a", "vpc_b"]);
    }

    #[test]
    fn test_instance_carries_node_definition() {
        let dir = TempDir::new().unwrap();
        let host = host(&dir, DEPLOYMENT).unwrap();
        let ctx = host.context("vpc_b", "apply").unwrap();

        assert!(ctx.node(Side::Current).is_a(MODULE_NODE_TYPE));
        assert_eq!(ctx.node(Side::Current).id, "vpc");
        assert_eq!(ctx.operation(), "apply");
    }

    #[test]
    fn test_runtime_properties_survive_reload() {
        let dir = TempDir::new().unwrap();
        let host = host(&dir, DEPLOYMENT).unwrap();
        let ctx = host.context("terraform_1", "install").unwrap();
        let runtime = ctx.runtime(Side::Current);
        runtime
            .set_as("executable_path", &"/opt/tf/terraform")
            .unwrap();
        runtime.update().unwrap();

        let reloaded = host.context("terraform_1", "uninstall").unwrap();
        assert_eq!(
            reloaded
                .runtime(Side::Current)
                .get_string("executable_path")
                .as_deref(),
            Some("/opt/tf/terraform")
        );
    }

    #[test]
    fn test_unknown_relationship_instance_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = host(
            &dir,
            "deployment: demo\nnodes: [{id: vpc}]\nrelationships: [{source: vpc_1, target: terraform_1}]\n",
        )
        .unwrap_err();
        assert!(err.to_string().contains("terraform_1"));
    }

    #[test]
    fn test_relative_directories_become_absolute() {
        let file: DeploymentFile = serde_yaml_ng::from_str(
            "deployment: demo\ndeployment_dir: ./deploy\nblueprint_dir: blueprint\nnodes: [{id: vpc}]\n",
        )
        .unwrap();
        let host = Host::from_file(file, Utf8PathBuf::from("tfkit.yaml")).unwrap();
        let cwd = std::env::current_dir().unwrap();

        assert!(host.deployment_dir().is_absolute());
        assert_eq!(host.deployment_dir(), cwd.join("deploy"));
        assert!(host.properties_path("vpc_1").is_absolute());
        let ctx = host.context("vpc_1", "apply").unwrap();
        assert_eq!(ctx.deployment_dir(), cwd.join("deploy"));
        let err = ctx.resources().download_resource("templates/vpc").unwrap_err();
        assert!(err
            .to_string()
            .contains(&cwd.join("blueprint").display().to_string()));
    }

    #[test]
    fn test_unknown_instance() {
        let dir = TempDir::new().unwrap();
        let host = host(&dir, DEPLOYMENT).unwrap();
        assert!(host.context("dns_1", "apply").is_err());
    }
}
