//! Type definitions for tfkit

pub mod resource_config;
pub mod state;
pub mod terraform_config;

pub use resource_config::{
    BackendConfig, ResourceConfig, SourceDescriptor, MISSING_INSTALLATION_SOURCE,
};
pub use state::{project_drift, project_inventory, DriftReport, ResourceInventory};
pub use terraform_config::TerraformConfig;
