//! Error types for the scanning pipeline.
//!
//! Each layer has its own enum; the orchestrator wraps them in [`ScanError`]
//! without dropping the underlying cause.

use crate::status::ScanStatus;
use std::path::PathBuf;
use thiserror::Error;

/// Object store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Addressed object does not exist
    #[error("Object not found: {bucket}/{key}")]
    NotFound { bucket: String, key: String },

    /// Addressed bucket does not exist
    #[error("Bucket not found: {0}")]
    NoSuchBucket(String),

    /// Bucket or key that cannot be mapped onto the store
    #[error("Invalid object name: {0}")]
    InvalidName(String),

    /// Store refused the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// IO error (file system operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Object metadata could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn invalid_name(msg: impl Into<String>) -> Self {
        Self::InvalidName(msg.into())
    }
}

/// Moving object content between the store and local scratch storage.
#[derive(Error, Debug)]
pub enum StageError {
    #[error("Failed to fetch object: {0}")]
    Fetch(#[source] StoreError),

    #[error("Failed to create {}: {source}", path.display())]
    CreateLocal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open {}: {source}", path.display())]
    OpenLocal {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to copy object body to {}: {source}", path.display())]
    Transfer {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to upload object: {0}")]
    Upload(#[source] StoreError),
}

/// External process failures (scanner or freshness checker).
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Failed to launch {}: {source}", program.display())]
    Launch {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} exited with code {}: {}", program.display(), format_exit_code(*code), stderr.trim())]
    Exit {
        program: PathBuf,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

impl ProcessError {
    /// Exit code of the process, `None` for launch failures and signal exits.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            ProcessError::Launch { .. } => None,
            ProcessError::Exit { code, .. } => *code,
        }
    }
}

fn format_exit_code(code: Option<i32>) -> String {
    match code {
        Some(code) => code.to_string(),
        None => "none (terminated by signal)".to_string(),
    }
}

/// Signature database synchronization and refresh failures.
#[derive(Error, Debug)]
pub enum DefinitionError {
    #[error("Failed to list definitions in bucket {bucket}: {source}")]
    List {
        bucket: String,
        #[source]
        source: StoreError,
    },

    #[error("Failed to read definitions directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to upload definition file {file}: {source}")]
    Upload {
        file: String,
        #[source]
        source: StageError,
    },

    #[error("Failed to download definition file {key}: {source}")]
    Download {
        key: String,
        #[source]
        source: StageError,
    },

    #[error("Failed to write freshclam config {}: {source}", path.display())]
    WriteConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot determine the OS user to run freshclam as")]
    UnknownUser,

    #[error("Definition update failed: {0}")]
    Update(#[source] ProcessError),
}

/// Failures of a single object scan.
#[derive(Error, Debug)]
pub enum ScanError {
    /// A tag write failed; no alternate status path exists.
    #[error("Failed to tag {bucket}/{key} as {status}: {source}")]
    Tagging {
        bucket: String,
        key: String,
        status: ScanStatus,
        #[source]
        source: StoreError,
    },

    /// Object could not be staged; it stays tagged `IN PROGRESS`.
    #[error("Failed to stage {bucket}/{key}: {source}")]
    Staging {
        bucket: String,
        key: String,
        #[source]
        source: StageError,
    },

    /// Engine failed; the object has been tagged `ERROR`.
    #[error("Scan engine failed: {0}")]
    Engine(#[source] ProcessError),

    /// Engine failed and the `ERROR` tag could not be written either.
    #[error("Scan engine failed ({engine}) and the ERROR tag could not be written: {tagging}")]
    ErrorTagFailed {
        engine: ProcessError,
        #[source]
        tagging: StoreError,
    },

    /// The scan completed but its scratch file could not be removed.
    #[error("Failed to remove scratch file {}: {source}", path.display())]
    Cleanup {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ScanError {
    /// Status the object is known to carry after this failure.
    pub fn status_left_on_object(&self) -> Option<ScanStatus> {
        match self {
            ScanError::Staging { .. } => Some(ScanStatus::InProgress),
            ScanError::Engine(_) => Some(ScanStatus::Error),
            ScanError::Tagging { .. } | ScanError::ErrorTagFailed { .. } => None,
            ScanError::Cleanup { .. } => None,
        }
    }
}

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}
