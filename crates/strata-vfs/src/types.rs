//! Listing and `info` metadata.
//!
//! [`EntryInfo::name`] is always the full backend-native path (an OS path on
//! local disk, a slash-separated key in memory or object stores), so the
//! registry can re-root listings without another lookup.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

/// What kind of object a path names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    File,
    Directory,
    /// Only reported by drivers that do not follow links.
    Symlink,
}

impl FileType {
    pub fn is_dir(self) -> bool {
        self == FileType::Directory
    }
}

/// One listing row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileType,
    /// Byte length; directories report 0.
    pub size: u64,
    /// Unix permission bits, when the backend has them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtime: Option<SystemTime>,
}

impl EntryInfo {
    fn new(name: impl Into<String>, kind: FileType, size: u64) -> Self {
        Self {
            name: name.into(),
            kind,
            size,
            mode: None,
            mtime: None,
        }
    }

    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self::new(name, FileType::File, size)
    }

    pub fn directory(name: impl Into<String>) -> Self {
        Self::new(name, FileType::Directory, 0)
    }

    pub fn with_mtime(self, mtime: SystemTime) -> Self {
        Self {
            mtime: Some(mtime),
            ..self
        }
    }

    pub fn with_mode(self, mode: u32) -> Self {
        Self {
            mode: Some(mode),
            ..self
        }
    }

    pub fn is_file(&self) -> bool {
        self.kind == FileType::File
    }

    pub fn is_dir(&self) -> bool {
        self.kind.is_dir()
    }
}
