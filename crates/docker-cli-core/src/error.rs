use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DockerCliError {
    #[error("failed to scan plugin directory {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("docker: '{name}' is not a docker command.")]
    PluginNotFound { name: String },

    #[error("plugin '{name}' is not valid: {source}")]
    InvalidPlugin {
        name: String,
        #[source]
        source: PluginError,
    },

    #[error("failed to run plugin {path}: {source}")]
    Exec {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("Failed to install interrupt handler: {0}")]
    SignalHandler(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Home directory not found")]
    HomeNotFound,
}

pub type Result<T> = std::result::Result<T, DockerCliError>;

impl DockerCliError {
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Exec { source, .. } => match source.kind() {
                std::io::ErrorKind::PermissionDenied => 126,
                std::io::ErrorKind::NotFound => 127,
                _ => 1,
            },
            _ => 1,
        }
    }

    /// True only when no candidate exists for the requested plugin name.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::PluginNotFound { .. })
    }
}

/// Lets callers decide between plugin errors and "unknown command" messaging.
pub fn is_not_found(err: &DockerCliError) -> bool {
    err.is_not_found()
}

/// Why a single plugin candidate failed validation.
///
/// Stored on the plugin entry instead of aborting discovery, so it must be
/// cheap to clone and carry no live handles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("failed to run plugin metadata command: {message}")]
    Spawn { message: String },

    #[error("plugin metadata command exited with {status}")]
    ExitStatus { status: String },

    #[error("plugin metadata command timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid plugin metadata: {message}")]
    MalformedMetadata { message: String },

    #[error("plugin SchemaVersion is missing")]
    MissingSchemaVersion,

    #[error("plugin SchemaVersion {version:?} is not valid: {message}")]
    InvalidSchemaVersion { version: String, message: String },

    #[error("plugin SchemaVersion {version:?} is not supported, must match {supported}")]
    IncompatibleSchemaVersion { version: String, supported: String },

    #[error("plugin candidate {name:?} did not match \"^[a-z][a-z0-9]*$\"")]
    InvalidName { name: String },

    #[error("plugin reported name {reported:?} but its filename declares {expected:?}")]
    NameMismatch { reported: String, expected: String },

    #[error("plugin {name:?} duplicates builtin command")]
    BuiltinCollision { name: String },

    #[error("plugin {name:?} duplicates an alias of builtin command {command:?}")]
    AliasCollision { name: String, command: String },
}
