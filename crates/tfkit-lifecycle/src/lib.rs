//! # tfkit-lifecycle
//!
//! Operations the host runs against node instances and relationships:
//! - `apply`, `state_pull`, `destroy` and `check_drift` around a scoped
//!   checkout of the source bundle
//! - `reload_template` to switch an instance to a new template
//! - `install`, `uninstall` and `set_directory_config` for the driver itself
//! - `refresh_resources` and `reload_resources` across module instances

pub mod operations;
pub mod workflows;

pub use operations::{
    apply, check_drift, destroy, install, reload_template, set_directory_config, state_pull,
    uninstall,
};
pub use workflows::{refresh_resources, reload_resources, select_modules, InstanceFilter};
