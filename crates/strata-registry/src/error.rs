//! Error types for config loading and path resolution.

use std::io;
use std::path::PathBuf;

use strata_vfs::VfsError;
use thiserror::Error;

use crate::resolver::RequestKind;

/// Errors from reading the sources file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file was missing and the placeholder default could not be written.
    #[error("config not found at {path} and the default could not be written: {source}")]
    NotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The platform has no per-user config directory.
    #[error("no per-user config directory on this platform")]
    NoConfigDir,

    /// The file exists but is not a usable document.
    #[error("malformed config {path}: {reason}")]
    Malformed { path: PathBuf, reason: String },

    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Errors from resolving and serving requests.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("missing required parameter `key`")]
    MissingKey,

    #[error("no filesystem found for key: {0}")]
    UnknownKey(String),

    #[error("missing required parameter `item_path` for {kind} request")]
    MissingPath { kind: RequestKind },

    /// The source is configured but its backend failed to construct.
    #[error("filesystem `{key}` is unavailable: {reason}")]
    BackendUnavailable { key: String, reason: String },

    #[error("path escapes backend root: {0}")]
    PathEscapesRoot(String),

    /// A protocol-qualified path names a different protocol than the backend.
    #[error("path `{path}` does not belong to the {protocol} backend")]
    ForeignProtocol { path: String, protocol: String },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Vfs(#[from] VfsError),
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
