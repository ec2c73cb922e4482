//! Driver errors.
//!
//! Every driver reports failures through [`VfsError`] so the registry can
//! tell "no such path" from "backend broken" without knowing which driver
//! it talked to.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VfsError {
    // Path-level failures. Each carries the backend path it concerns.
    #[error("no such file or directory: {0}")]
    NotFound(String),
    #[error("file exists: {0}")]
    AlreadyExists(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("is a directory: {0}")]
    IsADirectory(String),
    #[error("directory not empty: {0}")]
    DirectoryNotEmpty(String),
    /// `..` or a symlink would leave the backend root.
    #[error("outside backend root: {0}")]
    PathEscapesRoot(String),
    #[error("malformed path: {0}")]
    InvalidPath(String),

    /// Writes are disabled for this backend.
    #[error("read-only filesystem")]
    ReadOnly,

    // Construction failures.
    /// No driver is registered for the protocol.
    #[error("unknown protocol: {0}")]
    UnknownProtocol(String),
    /// A driver rejected its constructor arguments.
    #[error("invalid driver argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("{0}")]
    Other(String),
}

macro_rules! path_errors {
    ($($ctor:ident => $variant:ident),* $(,)?) => {
        $(
            #[doc = concat!("[`VfsError::", stringify!($variant), "`] for `path`.")]
            pub fn $ctor(path: impl Into<String>) -> Self {
                Self::$variant(path.into())
            }
        )*
    };
}

impl VfsError {
    path_errors! {
        not_found => NotFound,
        already_exists => AlreadyExists,
        permission_denied => PermissionDenied,
        not_a_directory => NotADirectory,
        is_a_directory => IsADirectory,
        directory_not_empty => DirectoryNotEmpty,
        path_escapes_root => PathEscapesRoot,
        invalid_path => InvalidPath,
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Map an I/O error onto the path-level variants where one fits.
    pub fn from_io(err: io::Error, path: impl Into<String>) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path),
            io::ErrorKind::NotADirectory => Self::NotADirectory(path),
            io::ErrorKind::IsADirectory => Self::IsADirectory(path),
            io::ErrorKind::DirectoryNotEmpty => Self::DirectoryNotEmpty(path),
            _ => Self::Io(err),
        }
    }

    /// True for [`VfsError::NotFound`] and unclassified not-found I/O errors.
    pub fn is_not_found(&self) -> bool {
        match self {
            VfsError::NotFound(_) => true,
            VfsError::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

pub type VfsResult<T> = Result<T, VfsError>;
