//! # tfkit-driver
//!
//! Invocation of the Terraform driver:
//! - **Output capture**: line consumers that log or buffer subprocess output
//! - **Process runner**: environment merging with credential redaction in logs
//! - **Terraform**: the driver command set bound to one root module
//! - **Installer**: executable and plugin download, unpack and removal

pub mod install;
pub mod output;
pub mod process;
pub mod terraform;

pub use install::{InstallPlan, InstallReport, Installer, UninstallPlan};
pub use output::{drain, CapturingConsumer, LoggingConsumer, OutputConsumer};
pub use process::{redact_env, ProcessRunner, RunOptions, REDACTED_ENV_KEYS};
pub use terraform::Terraform;
