//! Request-level file operations.
//!
//! [`FilesystemService`] is what a transport layer calls: each operation
//! picks up config changes, resolves `(key, path)` against one registry
//! snapshot and runs the backend call. Listings come back with key-qualified
//! names.

use std::path::Path;
use std::sync::Arc;

use strata_vfs::{AsyncFs, EntryInfo, VfsError};
use strum::{Display, EnumString};
use tracing::{debug, warn};

use crate::error::{RegistryError, RegistryResult};
use crate::manager::FilesystemManager;
use crate::registry::Registry;
use crate::resolver::{RequestKind, Resolved};

/// Result of a `get`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GetContent {
    /// Directory contents, names key-qualified.
    Listing(Vec<EntryInfo>),
    /// File contents.
    Bytes(Vec<u8>),
}

/// Same-backend file actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FileAction {
    Move,
    Copy,
}

impl FileAction {
    fn kind(self) -> RequestKind {
        match self {
            FileAction::Move => RequestKind::Move,
            FileAction::Copy => RequestKind::Copy,
        }
    }
}

/// Parse an HTTP-style byte range into `(start, inclusive end)`.
///
/// Accepts `bytes=START-END`, `START-END` and `START-`.
pub fn parse_range(range: &str) -> RegistryResult<(u64, Option<u64>)> {
    let invalid = || RegistryError::InvalidRange(range.to_string());
    let spec = range.trim();
    let spec = spec.strip_prefix("bytes=").unwrap_or(spec);
    let (start, end) = spec.split_once('-').ok_or_else(invalid)?;

    let start: u64 = start.trim().parse().map_err(|_| invalid())?;
    let end = match end.trim() {
        "" => None,
        end => Some(end.parse::<u64>().map_err(|_| invalid())?),
    };
    if matches!(end, Some(end) if end < start) {
        return Err(invalid());
    }
    Ok((start, end))
}

/// File operations over a [`FilesystemManager`].
#[derive(Debug, Clone)]
pub struct FilesystemService {
    manager: Arc<FilesystemManager>,
}

impl FilesystemService {
    pub fn new(manager: Arc<FilesystemManager>) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &Arc<FilesystemManager> {
        &self.manager
    }

    /// Pick up config changes and return the registry to serve from.
    async fn refresh(&self) -> Arc<Registry> {
        if let Err(e) = self.manager.check_reload_config().await {
            warn!(error = %e, "config reload failed, serving last good registry");
        }
        self.manager.snapshot()
    }

    /// List a directory or read a file.
    pub async fn get(&self, key: &str, path: &str) -> RegistryResult<GetContent> {
        let registry = self.refresh().await;
        let Resolved { entry, instance, path } = registry.validate(RequestKind::Get, key, path)?;

        if instance.isdir(&path).await {
            let listing = instance.ls(&path).await?;
            let listing = registry.map_paths(&entry.canonical_path, key, listing)?;
            Ok(GetContent::Listing(listing))
        } else {
            Ok(GetContent::Bytes(instance.cat(&path).await?))
        }
    }

    /// Read part of a file; `range` uses an inclusive end.
    pub async fn get_range(&self, key: &str, path: &str, range: &str) -> RegistryResult<Vec<u8>> {
        let (start, end) = parse_range(range)?;
        let registry = self.refresh().await;
        let resolved = registry.validate(RequestKind::Get, key, path)?;
        let end = end.map(|e| e.saturating_add(1));
        Ok(resolved.instance.cat_range(&resolved.path, start, end).await?)
    }

    /// Create a directory (path ends in `/`) or a file.
    pub async fn post(&self, key: &str, path: &str, content: Option<&[u8]>) -> RegistryResult<()> {
        let registry = self.refresh().await;
        let resolved = registry.validate(RequestKind::Post, key, path)?;

        if path.ends_with('/') {
            resolved.instance.mkdir(&resolved.path, true).await?;
        } else {
            resolved.instance.touch(&resolved.path).await?;
            if let Some(content) = content.filter(|c| !c.is_empty()) {
                resolved.instance.pipe(&resolved.path, content).await?;
            }
        }
        debug!(key, path = %resolved.path, "created");
        Ok(())
    }

    /// Replace the whole content of an existing file.
    pub async fn put(&self, key: &str, path: &str, content: &[u8]) -> RegistryResult<()> {
        let registry = self.refresh().await;
        let resolved = registry.validate(RequestKind::Put, key, path)?;
        require_file(resolved.instance.as_ref(), &resolved.path).await?;
        resolved.instance.pipe(&resolved.path, content).await?;
        Ok(())
    }

    /// Overwrite part of an existing file starting at `offset`.
    ///
    /// An offset past the end appends.
    pub async fn patch(
        &self,
        key: &str,
        path: &str,
        offset: u64,
        content: &[u8],
    ) -> RegistryResult<()> {
        let registry = self.refresh().await;
        let resolved = registry.validate(RequestKind::Patch, key, path)?;
        require_file(resolved.instance.as_ref(), &resolved.path).await?;

        let original = resolved.instance.cat(&resolved.path).await?;
        let offset = usize::try_from(offset).unwrap_or(usize::MAX).min(original.len());
        let tail = offset.saturating_add(content.len()).min(original.len());

        let mut patched = Vec::with_capacity(original.len().max(offset + content.len()));
        patched.extend_from_slice(&original[..offset]);
        patched.extend_from_slice(content);
        patched.extend_from_slice(&original[tail..]);
        resolved.instance.pipe(&resolved.path, &patched).await?;
        Ok(())
    }

    /// Remove a file or directory tree.
    pub async fn delete(&self, key: &str, path: &str) -> RegistryResult<()> {
        let registry = self.refresh().await;
        let resolved = registry.validate(RequestKind::Delete, key, path)?;
        resolved.instance.rm(&resolved.path, true).await?;
        debug!(key, path = %resolved.path, "deleted");
        Ok(())
    }

    /// Move or copy within one backend.
    pub async fn action(
        &self,
        key: &str,
        path: &str,
        destination: &str,
        action: FileAction,
    ) -> RegistryResult<()> {
        let registry = self.refresh().await;
        let source = registry.validate(action.kind(), key, path)?;
        let target = registry.validate(action.kind(), key, destination)?;
        match action {
            FileAction::Move => source.instance.mv(&source.path, &target.path).await?,
            FileAction::Copy => source.instance.copy(&source.path, &target.path).await?,
        }
        debug!(key, %action, from = %source.path, to = %target.path, "file action");
        Ok(())
    }

    /// Rename within one backend.
    ///
    /// A `new_path` without `/` names a sibling of `path`.
    pub async fn rename(&self, key: &str, path: &str, new_path: &str) -> RegistryResult<()> {
        let destination = if new_path.contains('/') {
            new_path.to_string()
        } else {
            match path.trim_end_matches('/').rsplit_once('/') {
                Some((dir, _)) => format!("{dir}/{new_path}"),
                None => new_path.to_string(),
            }
        };
        self.action(key, path, &destination, FileAction::Move).await
    }

    /// Copy a file or tree from one backend to another.
    ///
    /// A file copied onto an existing directory lands inside it. A tree
    /// cannot be copied into itself on the same source. Returns the number
    /// of files written.
    pub async fn transfer(
        &self,
        source_key: &str,
        source_path: &str,
        destination_key: &str,
        destination_path: &str,
    ) -> RegistryResult<usize> {
        let registry = self.refresh().await;
        let source = registry.validate(RequestKind::Get, source_key, source_path)?;
        let target = registry.validate(RequestKind::Transfer, destination_key, destination_path)?;
        let (src, dst) = (source.instance.as_ref(), target.instance.as_ref());

        if !src.isdir(&source.path).await {
            let data = src.cat(&source.path).await?;
            let to = if dst.isdir(&target.path).await {
                join_native(&target.path, basename(&source.path))
            } else {
                target.path.clone()
            };
            dst.pipe(&to, &data).await?;
            debug!(from = %source.path, %to, "transferred file");
            return Ok(1);
        }

        if source.entry.name == target.entry.name
            && Path::new(&target.path).starts_with(&source.path)
        {
            return Err(VfsError::invalid_path(format!(
                "cannot transfer {} into itself",
                source.path
            ))
            .into());
        }

        // Walk the whole source tree before writing, so the copy never
        // shows up in its own listing.
        let mut dirs = vec![target.path.clone()];
        let mut files = Vec::new();
        let mut pending = vec![(source.path.clone(), target.path.clone())];
        while let Some((from_dir, to_dir)) = pending.pop() {
            for child in src.ls(&from_dir).await? {
                let to = join_native(&to_dir, basename(&child.name));
                if child.is_dir() {
                    dirs.push(to.clone());
                    pending.push((child.name, to));
                } else {
                    files.push((child.name, to));
                }
            }
        }

        for dir in &dirs {
            dst.mkdir(dir, true).await?;
        }
        for (from, to) in &files {
            let data = src.cat(from).await?;
            dst.pipe(to, &data).await?;
        }
        debug!(from = %source.path, to = %target.path, files = files.len(), "transferred tree");
        Ok(files.len())
    }
}

async fn require_file(fs: &dyn AsyncFs, path: &str) -> RegistryResult<()> {
    let info = fs.info(path).await?;
    if info.is_dir() {
        return Err(VfsError::IsADirectory(path.to_string()).into());
    }
    Ok(())
}

fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn join_native(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{dir}{name}")
    } else {
        format!("{dir}/{name}")
    }
}
