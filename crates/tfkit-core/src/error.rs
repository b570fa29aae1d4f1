//! Error types for tfkit-core

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using tfkit-core's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for tfkit
///
/// Every variant is non-recoverable from the point of view of a single
/// operation; retries belong to the host's workflow engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration, with remediation text
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Missing required field
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    /// `resource_config.storage_path` points somewhere other than the instance directory
    #[error("The property resource_config.storage_path is no longer supported (got {path})")]
    UnsupportedStoragePath { path: String },

    /// An existing driver was declared but the executable is not there
    #[error(
        "use_existing_resource is set but no executable was found at {path}. \
         Install the driver there or set terraform_config.executable_path"
    )]
    MissingExecutable { path: String },

    /// A subprocess exited with a non-zero status
    #[error("Command '{command}' returned non-zero exit status {exit_code}")]
    Subprocess { command: String, exit_code: i32 },

    /// A subprocess could not be started
    #[error("Failed to start '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Permission failure on a specific path
    #[error("Permission denied writing {path}: {source}")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Download failure
    #[error("Failed to download {url}: {message}")]
    Download { url: String, message: String },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON parsing error: {0}")]
    JsonParse(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlParse(#[from] serde_yaml_ng::Error),

    /// Operation failed; the cause chain carries the root error
    #[error("{message}")]
    OperationFailed {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

impl Error {
    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingField {
            field: field.into(),
        }
    }

    /// Create a subprocess failure
    pub fn subprocess(command: impl Into<String>, exit_code: i32) -> Self {
        Self::Subprocess {
            command: command.into(),
            exit_code,
        }
    }

    /// Wrap an error as the cause of a failed operation
    pub fn operation_failed(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::OperationFailed {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Map an IO error on `path`, singling out permission failures
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                path: path.into(),
                source,
            }
        } else {
            Self::Io(source)
        }
    }

    /// Exit code of a failed subprocess, if this is one
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::Subprocess { exit_code, .. } => Some(*exit_code),
            _ => None,
        }
    }
}
