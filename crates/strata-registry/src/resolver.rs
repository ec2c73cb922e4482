//! Request validation and path translation.
//!
//! Clients address files as `(key, path)`. The path may be relative to the
//! source, key-qualified (`mem1/a.txt`), protocol-qualified
//! (`memory://m/a.txt`) or already backend-native (`m/a.txt`).
//! [`Registry::validate`] turns any of those into the backend-native path;
//! [`Registry::map_paths`] turns listing results back into key-qualified
//! names.

use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use strata_vfs::{AsyncFs, EntryInfo, MemoryBackend};
use strum::{AsRefStr, Display, EnumString};
use tracing::debug;

use crate::error::{RegistryError, RegistryResult};
use crate::factory::{canonical_protocol, split_protocol};
use crate::registry::{BackendEntry, Registry};

/// The operation a request performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum RequestKind {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Move,
    Copy,
    Transfer,
}

impl RequestKind {
    /// Reads may omit the path and get the backend root.
    pub fn is_read(self) -> bool {
        matches!(self, RequestKind::Get)
    }
}

/// A validated request target.
pub struct Resolved {
    pub entry: Arc<BackendEntry>,
    pub instance: Arc<dyn AsyncFs>,
    /// Backend-native path.
    pub path: String,
}

impl fmt::Debug for Resolved {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolved")
            .field("key", &self.entry.name)
            .field("protocol", &self.entry.protocol)
            .field("path", &self.path)
            .finish()
    }
}

impl Registry {
    /// Look up `key` and translate `raw_path` into a backend-native path.
    pub fn validate(
        &self,
        kind: RequestKind,
        key: &str,
        raw_path: &str,
    ) -> RegistryResult<Resolved> {
        if key.is_empty() {
            return Err(RegistryError::MissingKey);
        }
        let entry = self
            .get(key)
            .ok_or_else(|| RegistryError::UnknownKey(key.to_string()))?;
        let instance = match &entry.instance {
            Some(instance) => Arc::clone(instance),
            None => {
                let reason = entry
                    .error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "backend was not constructed".to_string());
                return Err(RegistryError::BackendUnavailable {
                    key: key.to_string(),
                    reason,
                });
            }
        };

        let path = if raw_path.is_empty() {
            if !kind.is_read() {
                return Err(RegistryError::MissingPath { kind });
            }
            if entry.is_local() {
                entry.root_path.clone()
            } else {
                String::new()
            }
        } else {
            resolve_path(entry, key, raw_path)?
        };

        debug!(%kind, key, raw_path, resolved = %path, "validated request");
        Ok(Resolved {
            entry: Arc::clone(entry),
            instance,
            path,
        })
    }

    /// Replace the backend root in listing names with `key`.
    ///
    /// `root_path` is only consulted when the entry has no root of its own.
    pub fn map_paths(
        &self,
        root_path: &str,
        key: &str,
        listing: Vec<EntryInfo>,
    ) -> RegistryResult<Vec<EntryInfo>> {
        let entry = self
            .get(key)
            .ok_or_else(|| RegistryError::UnknownKey(key.to_string()))?;

        let memory = entry.protocol == "memory";
        let root = if entry.root_path.is_empty() {
            let (_, stripped) = split_protocol(root_path);
            let stripped = stripped.trim_end_matches('/');
            if memory {
                stripped.trim_start_matches('/')
            } else {
                stripped
            }
        } else {
            entry.root_path.as_str()
        };

        Ok(listing
            .into_iter()
            .map(|mut item| {
                let name = if memory {
                    item.name.trim_start_matches('/')
                } else {
                    item.name.as_str()
                };
                item.name = join_key(key, relative_to(name, root).unwrap_or(name));
                item
            })
            .collect())
    }
}

fn resolve_path(entry: &BackendEntry, key: &str, raw_path: &str) -> RegistryResult<String> {
    // A protocol-qualified path is already backend-native; only bare paths
    // may carry the key.
    let (path, qualified) = match split_protocol(raw_path) {
        (Some(scheme), rest) if canonical_protocol(scheme) == entry.protocol => (rest, true),
        (Some(_), _) => {
            return Err(RegistryError::ForeignProtocol {
                path: raw_path.to_string(),
                protocol: entry.protocol.clone(),
            });
        }
        (None, path) => (path, false),
    };
    let root = entry.root_path.as_str();

    match entry.protocol.as_str() {
        "memory" => {
            let path = path.trim_start_matches('/');
            let anchored = !root.is_empty() && component_prefix(path, root);
            let path = if qualified || anchored {
                path
            } else {
                strip_key(path, key)
            };
            anchor_memory(root, path)
        }
        "file" => {
            let path = if qualified || Path::new(path).starts_with(root) {
                path
            } else {
                strip_key(path, key)
            };
            anchor_file(root, path)
        }
        _ if qualified => Ok(path.to_string()),
        _ => Ok(strip_key(path, key).to_string()),
    }
}

/// Drop a leading `key` component, with or without a leading `/`.
fn strip_key<'a>(path: &'a str, key: &str) -> &'a str {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed == key {
        return "";
    }
    match trimmed.strip_prefix(key).and_then(|rest| rest.strip_prefix('/')) {
        Some(rest) => rest,
        None => path,
    }
}

/// `path` equals `prefix` or continues it at a `/` boundary.
fn component_prefix(path: &str, prefix: &str) -> bool {
    prefix.is_empty() || relative_to(path, prefix).is_some()
}

/// The part of `path` below `root`, without a leading `/`.
fn relative_to<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    if root.is_empty() {
        return Some(path);
    }
    if path == root {
        return Some("");
    }
    let rest = path.strip_prefix(root)?;
    if root.ends_with('/') {
        Some(rest)
    } else {
        rest.strip_prefix('/')
    }
}

fn join_key(key: &str, relative: &str) -> String {
    match relative.trim_start_matches('/') {
        "" => key.to_string(),
        rest => format!("{key}/{rest}"),
    }
}

fn anchor_memory(root: &str, path: &str) -> RegistryResult<String> {
    let joined = if component_prefix(path, root) {
        path.to_string()
    } else {
        format!("{root}/{path}")
    };
    let escapes = || RegistryError::PathEscapesRoot(path.to_string());
    let normalized = MemoryBackend::normalize(&joined).map_err(|_| escapes())?;
    if !component_prefix(&normalized, root) {
        return Err(escapes());
    }
    Ok(normalized)
}

fn anchor_file(root: &str, path: &str) -> RegistryResult<String> {
    let root = Path::new(root);
    let candidate = Path::new(path);
    let joined = if candidate.starts_with(root) {
        candidate.to_path_buf()
    } else {
        root.join(path.trim_start_matches('/'))
    };
    let escapes = || RegistryError::PathEscapesRoot(path.to_string());
    let normalized = normalize_lexically(&joined).ok_or_else(escapes)?;
    if !normalized.starts_with(root) {
        return Err(escapes());
    }
    Ok(normalized.to_string_lossy().into_owned())
}

/// Resolve `.` and `..` without touching the filesystem.
pub(crate) fn normalize_lexically(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    return None;
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    Some(out)
}
