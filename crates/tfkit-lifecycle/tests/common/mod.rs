//! Common test utilities for tfkit-lifecycle
//!
//! Provides a blueprint with a small template, a deployment directory and a
//! fake driver script that mimics the Terraform subcommands the operations
//! use. The fake records every invocation in the file named by
//! `FAKE_TF_LOG` and fails the subcommand named by `FAKE_TF_FAIL`.

#![allow(dead_code)]

use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tfkit_bundle::{pack_directory, ExclusionSet};
use tfkit_core::{
    DirectoryResolver, InstanceHandle, MemoryStore, NodeHandle, OperationContext,
    MODULE_NODE_TYPE, TERRAFORM_NODE_TYPE,
};

pub const FAKE_TERRAFORM: &str = r#"#!/bin/sh
[ -n "$FAKE_TF_LOG" ] && echo "$*" >> "$FAKE_TF_LOG"
if [ "$FAKE_TF_FAIL" = "$1" ]; then
  if [ "$1" = "apply" ]; then
    echo '{"version": 4, "resources": [{"name": "partial"}]}' > terraform.tfstate
  fi
  echo "Error: $1 failed" >&2
  exit 1
fi
case "$1" in
  apply)
    echo '{"version": 4, "resources": [{"name": "vpc", "type": "null_resource"}]}' > terraform.tfstate ;;
  destroy)
    echo '{"version": 4, "resources": []}' > terraform.tfstate ;;
  plan)
    for arg in "$@"; do
      case "$arg" in -out=*) echo plan > "${arg#-out=}" ;; esac
    done ;;
  show)
    if [ -n "$FAKE_TF_PLAN" ]; then cat "$FAKE_TF_PLAN"; else echo '{"resource_changes": []}'; fi ;;
  state)
    if [ -f terraform.tfstate ]; then cat terraform.tfstate; fi ;;
esac
exit 0
"#;

/// Write the fake driver into `dir` as `terraform`
pub fn write_fake_terraform(dir: &Path) -> PathBuf {
    std::fs::create_dir_all(dir).unwrap();
    let path = dir.join("terraform");
    std::fs::write(&path, FAKE_TERRAFORM).unwrap();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    }
    path
}

/// A zip holding the fake driver, as a release archive would
pub fn fake_release_archive(dir: &Path) -> PathBuf {
    let staging = dir.join("release");
    write_fake_terraform(&staging);
    let packed = pack_directory(&staging, &ExclusionSet::new()).unwrap();
    let archive = dir.join("terraform_linux_amd64.zip");
    std::fs::copy(&packed, &archive).unwrap();
    std::fs::remove_dir_all(&staging).unwrap();
    archive
}

/// Blueprint, deployment directory and scratch space for one test
pub struct Deployment {
    pub blueprint: TempDir,
    pub deploy: TempDir,
    pub scratch: TempDir,
}

impl Deployment {
    pub fn new() -> Self {
        let blueprint = TempDir::new().unwrap();
        for (name, body) in [
            ("templates/vpc/main.tf", "resource \"null_resource\" \"vpc\" {}\n"),
            ("templates/vpc/variables.tf", "variable \"cidr\" {}\n"),
            ("templates/dns/main.tf", "resource \"null_resource\" \"dns\" {}\n"),
        ] {
            let path = blueprint.path().join(name);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }

        Self {
            blueprint,
            deploy: TempDir::new().unwrap(),
            scratch: TempDir::new().unwrap(),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.scratch.path().join("calls.log")
    }

    /// Every recorded driver invocation, reduced to the subcommand
    pub fn subcommands(&self) -> Vec<String> {
        std::fs::read_to_string(self.log_path())
            .unwrap_or_default()
            .lines()
            .filter_map(|line| line.split_whitespace().next().map(str::to_string))
            .collect()
    }

    pub fn instance_dir(&self, instance: &str) -> PathBuf {
        self.deploy.path().join(instance)
    }

    /// Environment handed to the fake driver
    pub fn driver_env(&self, extra: &[(&str, &str)]) -> Value {
        let mut env = Map::new();
        env.insert(
            "FAKE_TF_LOG".to_string(),
            json!(self.log_path().to_string_lossy()),
        );
        for (key, value) in extra {
            env.insert(key.to_string(), json!(value));
        }
        Value::Object(env)
    }

    pub fn instance(&self, node: &str, instance: &str, types: &[&str], properties: Value) -> InstanceHandle {
        InstanceHandle::new(
            instance,
            NodeHandle::new(node, properties.as_object().cloned().unwrap_or_default())
                .with_types(types.iter().map(|t| t.to_string()).collect()),
            Arc::new(MemoryStore::new()),
        )
    }

    pub fn context(&self, instance: InstanceHandle, operation: &str) -> OperationContext {
        OperationContext::node_instance(
            instance,
            self.deploy.path(),
            Arc::new(DirectoryResolver::new(self.blueprint.path())),
        )
        .with_operation(operation)
    }

    pub fn relationship(&self, source: InstanceHandle, target: InstanceHandle) -> OperationContext {
        OperationContext::relationship(
            source,
            target,
            self.deploy.path(),
            Arc::new(DirectoryResolver::new(self.blueprint.path())),
        )
        .with_operation("set_directory_config")
    }

    /// A module using the fake driver placed in the scratch directory
    pub fn module(&self, instance: &str, source: &str, extra_env: &[(&str, &str)]) -> InstanceHandle {
        let executable = write_fake_terraform(&self.scratch.path().join("bin"));
        self.instance(
            instance.split('_').next().unwrap_or(instance),
            instance,
            &[MODULE_NODE_TYPE],
            json!({
                "resource_config": {
                    "source": source,
                    "variables": {"cidr": "10.0.0.0/16"},
                    "environment_variables": self.driver_env(extra_env),
                    "use_existing_resource": true
                },
                "terraform_config": {"executable_path": executable.to_string_lossy()}
            }),
        )
    }

    /// A driver installation node fed from a local release archive
    pub fn terraform_node(&self, instance: &str) -> InstanceHandle {
        let archive = fake_release_archive(self.scratch.path());
        self.instance(
            "terraform",
            instance,
            &[TERRAFORM_NODE_TYPE],
            json!({
                "resource_config": {
                    "use_existing_resource": false,
                    "installation_source": archive.to_string_lossy()
                }
            }),
        )
    }
}
