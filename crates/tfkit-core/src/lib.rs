//! # tfkit-core
//!
//! Core library for tfkit providing:
//! - The explicit operation context and the runtime property store contract
//! - Typed `resource_config` / `terraform_config` with boundary validation
//! - Lazy, memoized resolution of driver paths
//! - Projection of driver state and plan JSON into inventory and drift

pub mod context;
pub mod error;
pub mod resolve;
pub mod store;
pub mod types;
pub mod utils;

pub use context::{
    DirectoryResolver, InstanceHandle, NodeHandle, OperationContext, ResourceResolver, Side,
    MODULE_NODE_TYPE, TERRAFORM_NODE_TYPE,
};
pub use error::{Error, Result};
pub use resolve::DriverPaths;
pub use store::{keys, JsonFileStore, MemoryStore, PropertyStore, PropertyStoreExt};
