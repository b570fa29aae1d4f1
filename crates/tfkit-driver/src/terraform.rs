//! Terraform command wrapper.
//!
//! Every command runs in the root module directory with the configured
//! environment. Commands that consume variables get a generated `-var-file`
//! that lives in the root module only for the duration of the command.

use crate::process::{ProcessRunner, RunOptions};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tfkit_bundle::Workspace;
use tfkit_core::utils::{ensure_dir, resolve_executable};
use tfkit_core::{Error, Result};
use tracing::{debug, info};

/// A configured Terraform driver bound to one root module
#[derive(Debug, Clone)]
pub struct Terraform {
    executable: PathBuf,
    root_module: PathBuf,
    plugins_dir: Option<PathBuf>,
    variables: Map<String, Value>,
    environment: HashMap<String, String>,
    runner: ProcessRunner,
}

impl Terraform {
    pub fn new(executable: impl Into<PathBuf>, root_module: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
            root_module: root_module.into(),
            plugins_dir: None,
            variables: Map::new(),
            environment: HashMap::new(),
            runner: ProcessRunner::new(),
        }
    }

    pub fn with_plugins_dir(mut self, plugins_dir: impl Into<PathBuf>) -> Self {
        self.plugins_dir = Some(plugins_dir.into());
        self
    }

    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_environment(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = environment;
        self
    }

    /// Build the driver for a checked out workspace.
    ///
    /// For an existing resource the executable must already be present; a
    /// bare name is looked up on `PATH` and a missing plugins directory is
    /// created.
    pub fn from_workspace(workspace: &Workspace) -> Result<Self> {
        let paths = &workspace.paths;
        let config = &workspace.config;

        let mut executable = paths.executable.clone();
        if config.use_existing_resource {
            executable = resolve_executable(&executable);
            if !executable.is_file() {
                return Err(Error::MissingExecutable {
                    path: executable.display().to_string(),
                });
            }
            if !paths.plugins_dir.exists() {
                ensure_dir(&paths.plugins_dir)?;
            }
        }

        Ok(Self::new(executable, &workspace.working_dir)
            .with_plugins_dir(&paths.plugins_dir)
            .with_variables(config.variables.clone())
            .with_environment(config.environment_variables.clone()))
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn root_module(&self) -> &Path {
        &self.root_module
    }

    /// Plugins directory, only when it holds something worth passing to `init`
    fn populated_plugins_dir(&self) -> Option<&Path> {
        let dir = self.plugins_dir.as_deref()?;
        let mut entries = std::fs::read_dir(dir).ok()?;
        entries.next().is_some().then_some(dir)
    }

    fn options(&self, capture_output: bool) -> RunOptions {
        RunOptions {
            cwd: Some(self.root_module.clone()),
            extra_env: self.environment.clone(),
            capture_output,
        }
    }

    async fn run(&self, args: Vec<String>, capture_output: bool) -> Result<Option<String>> {
        self.runner
            .run(&self.executable, &args, &self.options(capture_output))
            .await
    }

    /// Run with a generated variables file appended to `args`
    async fn run_with_vars(&self, mut args: Vec<String>) -> Result<()> {
        let vars_file = self.write_vars_file()?;
        args.push(format!("-var-file={}", vars_file.display()));
        let result = self.run(args, false).await;
        drop(vars_file);
        result.map(|_| ())
    }

    fn write_vars_file(&self) -> Result<TempPath> {
        let file = tempfile::Builder::new()
            .prefix("tfkit-vars-")
            .suffix(".json")
            .tempfile_in(&self.root_module)
            .map_err(|e| Error::from_io(&self.root_module, e))?;
        serde_json::to_writer(file.as_file(), &self.variables)?;
        let path = file.into_temp_path();
        debug!("Wrote variables to {}", path.display());
        Ok(path)
    }

    async fn run_json(&self, args: Vec<String>) -> Result<Value> {
        let output = self.run(args, true).await?.unwrap_or_default();
        if output.trim().is_empty() {
            return Ok(Value::Object(Map::new()));
        }
        Ok(serde_json::from_str(&output)?)
    }

    pub async fn version(&self) -> Result<String> {
        Ok(self
            .run(args(&["version"]), true)
            .await?
            .unwrap_or_default())
    }

    /// `terraform init`, passing the plugins directory when it is populated
    pub async fn init(&self, extra_args: &[String]) -> Result<()> {
        let mut command = args(&["init", "-no-color", "-input=false"]);
        if let Some(plugins_dir) = self.populated_plugins_dir() {
            command.push(format!("--plugin-dir={}", plugins_dir.display()));
        }
        command.extend(extra_args.iter().cloned());
        self.run_with_vars(command).await
    }

    pub async fn plan(&self, out: Option<&Path>) -> Result<()> {
        let mut command = args(&["plan", "-no-color", "-input=false"]);
        if let Some(out) = out {
            command.push(format!("-out={}", out.display()));
        }
        self.run_with_vars(command).await
    }

    /// `terraform show -json` of a saved plan
    pub async fn show_json(&self, plan_file: &Path) -> Result<Value> {
        let mut command = args(&["show", "-no-color", "-json"]);
        command.push(plan_file.display().to_string());
        self.run_json(command).await
    }

    /// Plan into a scratch plan file and return its JSON rendering
    pub async fn plan_and_show(&self) -> Result<Value> {
        let plan_file = tempfile::Builder::new()
            .prefix("tfkit-plan-")
            .suffix(".tfplan")
            .tempfile_in(&self.root_module)
            .map_err(|e| Error::from_io(&self.root_module, e))?
            .into_temp_path();
        self.plan(Some(&plan_file)).await?;
        self.show_json(&plan_file).await
    }

    pub async fn apply(&self) -> Result<()> {
        info!("Applying {}", self.root_module.display());
        self.run_with_vars(args(&["apply", "-auto-approve", "-no-color", "-input=false"]))
            .await
    }

    pub async fn destroy(&self) -> Result<()> {
        info!("Destroying {}", self.root_module.display());
        self.run_with_vars(args(&["destroy", "-auto-approve", "-no-color", "-input=false"]))
            .await
    }

    pub async fn refresh(&self) -> Result<()> {
        self.run_with_vars(args(&["refresh", "-no-color"])).await
    }

    /// Root module outputs as JSON
    pub async fn output(&self) -> Result<Value> {
        self.run_json(args(&["output", "-json", "-no-color"])).await
    }

    /// Current state; an empty object when there is none yet
    pub async fn state_pull(&self) -> Result<Value> {
        self.run_json(args(&["state", "pull"])).await
    }

    /// Dependency graph in DOT format
    pub async fn graph(&self) -> Result<String> {
        Ok(self.run(args(&["graph"]), true).await?.unwrap_or_default())
    }
}

fn args(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// A fake driver that records its arguments and the var file content
    fn recording_driver(dir: &Path) -> PathBuf {
        let script = dir.join("terraform");
        std::fs::write(
            &script,
            r#"#!/bin/sh
echo "$@" >> "$(dirname "$0")/calls.log"
for arg in "$@"; do
  case "$arg" in
    -var-file=*) cat "${arg#-var-file=}" > "$(dirname "$0")/vars.json" ;;
  esac
done
case "$1" in
  state) echo '{"version": 4, "resources": [{"name": "vpc"}]}' ;;
  output) echo '{"vpc_id": {"value": "vpc-123"}}' ;;
  version) echo 'Terraform v1.5.7' ;;
esac
"#,
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    fn calls(dir: &Path) -> Vec<String> {
        std::fs::read_to_string(dir.join("calls.log"))
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[tokio::test]
    async fn test_apply_passes_vars_file_and_removes_it() {
        let bin = TempDir::new().unwrap();
        let module = TempDir::new().unwrap();
        let mut variables = Map::new();
        variables.insert("cidr".to_string(), Value::from("10.0.0.0/16"));

        let terraform =
            Terraform::new(recording_driver(bin.path()), module.path()).with_variables(variables);
        terraform.apply().await.unwrap();

        let calls = calls(bin.path());
        assert_eq!(calls.len(), 1);
        assert!(calls[0].starts_with("apply -auto-approve -no-color -input=false -var-file="));
        let vars: Value =
            serde_json::from_str(&std::fs::read_to_string(bin.path().join("vars.json")).unwrap())
                .unwrap();
        assert_eq!(vars["cidr"], "10.0.0.0/16");
        assert_eq!(std::fs::read_dir(module.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_init_skips_empty_plugins_dir() {
        let bin = TempDir::new().unwrap();
        let module = TempDir::new().unwrap();
        let plugins = module.path().join(".terraform/plugins");
        std::fs::create_dir_all(&plugins).unwrap();

        let terraform =
            Terraform::new(recording_driver(bin.path()), module.path()).with_plugins_dir(&plugins);
        terraform.init(&[]).await.unwrap();
        assert!(!calls(bin.path())[0].contains("--plugin-dir"));

        std::fs::create_dir_all(plugins.join("aws")).unwrap();
        terraform
            .init(&["-upgrade".to_string()])
            .await
            .unwrap();
        let second = &calls(bin.path())[1];
        assert!(second.contains(&format!("--plugin-dir={}", plugins.display())));
        assert!(second.contains("-upgrade"));
    }

    #[tokio::test]
    async fn test_json_commands_are_parsed() {
        let bin = TempDir::new().unwrap();
        let module = TempDir::new().unwrap();
        let terraform = Terraform::new(recording_driver(bin.path()), module.path());

        let state = terraform.state_pull().await.unwrap();
        assert_eq!(state["resources"][0]["name"], "vpc");
        let outputs = terraform.output().await.unwrap();
        assert_eq!(outputs["vpc_id"]["value"], "vpc-123");
        assert!(terraform.version().await.unwrap().contains("v1.5.7"));
    }

    #[tokio::test]
    async fn test_empty_state_is_empty_object() {
        let bin = TempDir::new().unwrap();
        let module = TempDir::new().unwrap();
        let script = bin.path().join("terraform");
        std::fs::write(&script, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let state = Terraform::new(&script, module.path())
            .state_pull()
            .await
            .unwrap();
        assert_eq!(state, Value::Object(Map::new()));
    }

    #[tokio::test]
    async fn test_failure_keeps_exit_code() {
        let bin = TempDir::new().unwrap();
        let module = TempDir::new().unwrap();
        let script = bin.path().join("terraform");
        std::fs::write(&script, "#!/bin/sh\necho 'Error: boom' >&2\nexit 1\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let err = Terraform::new(&script, module.path())
            .destroy()
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
        // The var file is removed on failure too
        assert_eq!(std::fs::read_dir(module.path()).unwrap().count(), 0);
    }
}
