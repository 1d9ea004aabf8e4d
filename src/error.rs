//! Error types for cairn
//!
//! All modules use `CairnResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for cairn operations
pub type CairnResult<T> = Result<T, CairnError>;

/// All errors that can occur in cairn
#[derive(Error, Debug)]
pub enum CairnError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Missing initial FROM instruction")]
    MissingBaseImage,

    #[error("Invalid instruction: {0}")]
    InvalidInstruction(String),

    // Engine errors
    #[error("Container engine not found: {0}")]
    EngineNotFound(String),

    #[error("Engine {operation} failed: {reason}")]
    Engine { operation: String, reason: String },

    #[error("Failed to process json stream for {context}, error: {reason}")]
    ProgressStream { context: String, reason: String },

    // Image errors
    #[error("No such image: {0}")]
    ImageNotFound(String),

    #[error("Failed to build image: {0}")]
    ImageBuild(String),

    #[error("Couldn't find image id out of docker build output")]
    ImageIdNotFound,

    #[error("Failed to pull image: {image}, error: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Failed to push image: {image}, error: {reason}")]
    ImagePush { image: String, reason: String },

    #[error("Invalid image name: {0}")]
    ImageNameInvalid(String),

    // Cache errors
    #[error("Timeout while fetching cached images after {millis}ms")]
    CacheProbeTimeout { millis: u64 },

    #[error("Failed to inspect cache candidate {image}: {reason}")]
    CacheCandidate { image: String, reason: String },

    // Container errors
    #[error("Failed to create {purpose} container {name}: {reason}")]
    ContainerCreate {
        name: String,
        purpose: String,
        reason: String,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("{0}")]
    User(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CairnError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create an engine call error
    pub fn engine(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Engine {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::EngineNotFound(_) => {
                Some("Install docker or podman, or set [engine] binary in the config file")
            }
            Self::MissingBaseImage => Some("Start the build with a FROM instruction (--from)"),
            Self::CacheProbeTimeout { .. } => {
                Some("Raise [build] probe_timeout_secs or run with --no-cache")
            }
            Self::ImageIdNotFound => Some("Check the engine version; the build output format may have changed"),
            _ => None,
        }
    }
}
