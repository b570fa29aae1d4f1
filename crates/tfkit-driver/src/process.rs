//! Subprocess execution with streamed output.
//!
//! The child inherits the current environment with `extra_env` merged on top.
//! stdout is either captured or logged; stderr is always logged. The call
//! returns only after the child exited and both drain tasks finished.

use crate::output::{drain, CapturingConsumer, LoggingConsumer};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tfkit_core::{Error, Result};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Environment keys whose values never reach the log
pub const REDACTED_ENV_KEYS: &[&str] = &[
    "AWS_ACCESS_KEY_ID",
    "AWS_SECRET_ACCESS_KEY",
    "AWS_SESSION_TOKEN",
    "ARM_CLIENT_SECRET",
    "ARM_ACCESS_KEY",
    "ARM_SAS_TOKEN",
    "GOOGLE_CREDENTIALS",
    "GOOGLE_OAUTH_ACCESS_TOKEN",
    "DIGITALOCEAN_TOKEN",
    "VAULT_TOKEN",
    "TF_TOKEN",
    "TFE_TOKEN",
];

const REDACTED: &str = "[REDACTED]";

/// Per-invocation options
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Working directory; the current directory when unset
    pub cwd: Option<PathBuf>,

    /// Variables merged over the inherited environment
    pub extra_env: HashMap<String, String>,

    /// Return stdout instead of logging it
    pub capture_output: bool,
}

impl RunOptions {
    pub fn in_dir(cwd: impl Into<PathBuf>) -> Self {
        Self {
            cwd: Some(cwd.into()),
            ..Default::default()
        }
    }

    pub fn with_env(mut self, extra_env: HashMap<String, String>) -> Self {
        self.extra_env = extra_env;
        self
    }

    pub fn capturing(mut self) -> Self {
        self.capture_output = true;
        self
    }
}

/// Copy of `env` safe for logging
pub fn redact_env(env: &HashMap<String, String>) -> BTreeMap<String, String> {
    env.iter()
        .map(|(key, value)| {
            let shown = if REDACTED_ENV_KEYS.contains(&key.as_str()) {
                REDACTED.to_string()
            } else {
                value.clone()
            };
            (key.clone(), shown)
        })
        .collect()
}

fn command_line(program: &Path, args: &[String]) -> String {
    std::iter::once(program.display().to_string())
        .chain(args.iter().cloned())
        .collect::<Vec<_>>()
        .join(" ")
}

enum StdoutTask {
    Captured(JoinHandle<CapturingConsumer>),
    Logged(JoinHandle<LoggingConsumer>),
}

/// Runs external commands
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }

    /// Run `program` with `args`, returning captured stdout when requested.
    ///
    /// A non-zero exit is reported as [`Error::Subprocess`].
    pub async fn run(
        &self,
        program: &Path,
        args: &[String],
        options: &RunOptions,
    ) -> Result<Option<String>> {
        let command = command_line(program, args);
        info!(
            "Running: command={}, cwd={}, env={:?}",
            command,
            options
                .cwd
                .as_deref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ".".to_string()),
            redact_env(&options.extra_env)
        );

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(&options.extra_env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(cwd) = &options.cwd {
            cmd.current_dir(cwd);
        }

        let mut child = cmd.spawn().map_err(|source| Error::Spawn {
            command: command.clone(),
            source,
        })?;

        let stdout_task = child.stdout.take().map(|stdout| {
            if options.capture_output {
                StdoutTask::Captured(drain(stdout, CapturingConsumer::default()))
            } else {
                StdoutTask::Logged(drain(stdout, LoggingConsumer::stdout()))
            }
        });
        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| drain(stderr, LoggingConsumer::stderr()));

        let status = child.wait().await.map_err(|source| Error::Spawn {
            command: command.clone(),
            source,
        })?;

        let captured = match stdout_task {
            Some(StdoutTask::Captured(task)) => Some(
                task.await
                    .map_err(|e| Error::Io(std::io::Error::other(e)))?
                    .into_output(),
            ),
            Some(StdoutTask::Logged(task)) => {
                task.await.map_err(|e| Error::Io(std::io::Error::other(e)))?;
                None
            }
            None => None,
        };
        if let Some(task) = stderr_task {
            task.await.map_err(|e| Error::Io(std::io::Error::other(e)))?;
        }

        if !status.success() {
            return Err(Error::subprocess(command, status.code().unwrap_or(-1)));
        }

        debug!(
            "Returning output:\n{}",
            captured.as_deref().unwrap_or("<None>")
        );
        Ok(captured)
    }
}
