//! Resource configuration types
//!
//! `resource_config` is the declarative input of a Terraform module or
//! installation node. It is deserialized and validated once, at the
//! boundary, instead of being read key by key.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Where the template comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
    /// Local path, blueprint-relative path, or URL
    pub location: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

impl SourceDescriptor {
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            username: None,
            password: None,
        }
    }

    /// Whether the location is fetched over HTTP(S)
    pub fn is_remote(&self) -> bool {
        self.location.starts_with("http://") || self.location.starts_with("https://")
    }
}

// Accept either `source: "path"` or `source: {location: ...}`
impl<'de> Deserialize<'de> for SourceDescriptor {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Full {
            location: String,
            #[serde(default)]
            username: Option<String>,
            #[serde(default)]
            password: Option<String>,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Location(String),
            Full(Full),
        }

        Ok(match Repr::deserialize(deserializer)? {
            Repr::Location(location) => SourceDescriptor::new(location),
            Repr::Full(full) => SourceDescriptor {
                location: full.location,
                username: full.username,
                password: full.password,
            },
        })
    }
}

/// Remote state backend declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,

    #[serde(default)]
    pub options: Map<String, Value>,
}

impl BackendConfig {
    /// File name the backend block is written to
    pub fn file_name(&self) -> String {
        format!("{}.tf", self.name)
    }

    /// Render the `terraform { backend ... }` block
    pub fn render(&self) -> String {
        let mut options = String::new();
        for (name, value) in &self.options {
            let rendered = match value {
                Value::String(s) => format!("\"{}\"", s),
                other => other.to_string(),
            };
            options.push_str(&format!("        {} = {}\n", name, rendered));
        }
        format!(
            "terraform {{\n    backend \"{}\" {{\n{}    }}\n}}\n",
            self.name, options
        )
    }
}

const PLUGINS_REMEDIATION: &str = "If you wish to use custom Terraform providers you must provide a \
dictionary in the following format: search.path/provider_name: url. For example:\n\
plugins:\n  registry.terraform.io/hashicorp/template: \
https://releases.hashicorp.com/terraform-provider-template/2.1.2/\
terraform-provider-template_2.1.2_linux_amd64.zip";

/// Plugins must be a name -> URL mapping; `null` or an empty list mean none
fn deserialize_plugins<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match value {
        Value::Null => Ok(BTreeMap::new()),
        Value::Array(items) if items.is_empty() => Ok(BTreeMap::new()),
        Value::Object(map) => map
            .into_iter()
            .map(|(name, url)| match url {
                Value::String(url) => Ok((name, url)),
                other => Err(serde::de::Error::custom(format!(
                    "The plugins value is not valid: plugin '{}' has URL {}. {}",
                    name, other, PLUGINS_REMEDIATION
                ))),
            })
            .collect(),
        other => Err(serde::de::Error::custom(format!(
            "The plugins value is not valid: {}. {}",
            other, PLUGINS_REMEDIATION
        ))),
    }
}

/// Raised when a driver must be installed but no download location is set
pub const MISSING_INSTALLATION_SOURCE: &str = "No download URL for terraform binary executable file \
was provided and use_existing_resource is False. Please provide a valid download URL";

fn default_use_existing() -> bool {
    true
}

/// Declarative configuration of a module or installation node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Template source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceDescriptor>,

    /// Fixed sub-path of the bundle holding the root module
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,

    /// Terraform input variables
    #[serde(default)]
    pub variables: Map<String, Value>,

    /// Extra environment for driver invocations
    #[serde(default)]
    pub environment_variables: HashMap<String, String>,

    /// Provider plugins, name -> download URL
    #[serde(default, deserialize_with = "deserialize_plugins")]
    pub plugins: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendConfig>,

    /// Use a driver that was installed outside tfkit
    #[serde(default = "default_use_existing")]
    pub use_existing_resource: bool,

    /// URL or path of the driver archive
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_source: Option<String>,

    /// Deprecated; only accepted when equal to the instance directory
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,

    /// Plugins directory override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<String>,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            source: None,
            source_path: None,
            variables: Map::new(),
            environment_variables: HashMap::new(),
            plugins: BTreeMap::new(),
            backend: None,
            use_existing_resource: default_use_existing(),
            installation_source: None,
            storage_path: None,
            plugins_dir: None,
        }
    }
}

impl ResourceConfig {
    /// Parse and validate a raw `resource_config` value
    pub fn from_value(value: Value) -> Result<Self> {
        let config: ResourceConfig = serde_json::from_value(value)
            .map_err(|e| Error::invalid_config(format!("resource_config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Boundary validation beyond what the types enforce
    pub fn validate(&self) -> Result<()> {
        if let Some(source) = &self.source {
            if source.location.trim().is_empty() {
                return Err(Error::invalid_config(
                    "resource_config.source.location is empty. Provide a path or URL of the template",
                ));
            }
        }
        if let Some(backend) = &self.backend {
            if backend.name.trim().is_empty() {
                return Err(Error::invalid_config(
                    "resource_config.backend.name is empty. Provide a backend type such as \"s3\"",
                ));
            }
        }
        Ok(())
    }

    /// Template source, required by operations that fetch it
    pub fn require_source(&self) -> Result<&SourceDescriptor> {
        self.source
            .as_ref()
            .ok_or_else(|| Error::missing_field("resource_config.source"))
    }
}
