//! Driver configuration types

use serde::{Deserialize, Serialize};

/// `terraform_config`: where the driver lives and where it works
///
/// Every field is optional; unresolved fields fall back to computed defaults
/// under the instance directory (see [`crate::resolve`]).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerraformConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executable_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<String>,
}

impl TerraformConfig {
    pub fn is_empty(&self) -> bool {
        self.executable_path.is_none() && self.storage_path.is_none() && self.plugins_dir.is_none()
    }
}
