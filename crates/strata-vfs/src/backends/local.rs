//! Disk-backed driver for `file` sources.
//!
//! Natively async on top of `tokio::fs`. Every path is jailed to the
//! source root, lexically and through symlinks.

use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};
use tokio::fs;

use crate::error::{VfsError, VfsResult};
use crate::ops::AsyncFs;
use crate::types::{EntryInfo, FileType};

/// A directory tree on local disk.
///
/// Accepts absolute OS paths under `root`, or paths relative to it. For
/// example, if `root` is `/home/amy/project`, both `src/main.rs` and
/// `/home/amy/project/src/main.rs` name the same file.
///
/// A `..` or symlink that leaves the root is refused with
/// [`VfsError::PathEscapesRoot`].
#[derive(Debug, Clone)]
pub struct LocalBackend {
    /// Root as configured.
    root: PathBuf,
    /// Root with symlinks resolved (e.g. macOS `/tmp` → `/private/tmp`).
    canonical_root: PathBuf,
    read_only: bool,
}

impl LocalBackend {
    /// Writable backend rooted at `root`. The root need not exist yet.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root: PathBuf = root.into();
        let canonical_root = dunce::canonicalize(&root).unwrap_or_else(|_| root.clone());
        Self {
            root,
            canonical_root,
            read_only: false,
        }
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
    }

    /// Lexically resolve `.` and `..` without touching the disk.
    fn lexical_normalize(path: &Path) -> VfsResult<PathBuf> {
        let mut result = PathBuf::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    if !result.pop() {
                        return Err(VfsError::path_escapes_root(path.display().to_string()));
                    }
                }
                other => result.push(other.as_os_str()),
            }
        }
        Ok(result)
    }

    fn is_within_root(&self, path: &Path) -> bool {
        path.starts_with(&self.root) || path.starts_with(&self.canonical_root)
    }

    /// Resolve a backend path to an absolute path within the root.
    ///
    /// Returns an error if the path escapes the root, lexically or through
    /// a symlink.
    fn resolve(&self, path: &str) -> VfsResult<PathBuf> {
        let requested = Path::new(path);
        let full = if path.is_empty() {
            self.root.clone()
        } else if requested.is_absolute() {
            requested.to_path_buf()
        } else {
            self.root.join(requested)
        };

        let normalized = Self::lexical_normalize(&full)?;
        if !self.is_within_root(&normalized) {
            tracing::warn!(
                path = %normalized.display(),
                root = %self.root.display(),
                "blocked path outside backend root"
            );
            return Err(VfsError::path_escapes_root(format!(
                "{} is not under {}",
                normalized.display(),
                self.root.display()
            )));
        }

        // Existing paths (or their nearest existing parent) must not leave
        // the root through a symlink.
        let probe = normalized
            .ancestors()
            .find(|p| p.exists())
            .map(Path::to_path_buf);
        if let Some(probe) = probe {
            let canonical = dunce::canonicalize(&probe).map_err(VfsError::from)?;
            if !canonical.starts_with(&self.canonical_root) && !canonical.starts_with(&self.root)
            {
                return Err(VfsError::path_escapes_root(format!(
                    "{} resolves outside {}",
                    normalized.display(),
                    self.root.display()
                )));
            }
        }

        Ok(normalized)
    }

    fn check_writable(&self) -> VfsResult<()> {
        if self.read_only {
            Err(VfsError::ReadOnly)
        } else {
            Ok(())
        }
    }

    fn display(path: &Path) -> String {
        path.display().to_string()
    }

    /// Convert std::fs::Metadata to an entry.
    fn metadata_to_info(path: &Path, meta: &std::fs::Metadata) -> EntryInfo {
        let kind = if meta.is_dir() {
            FileType::Directory
        } else if meta.file_type().is_symlink() {
            FileType::Symlink
        } else {
            FileType::File
        };

        let mut info = EntryInfo {
            name: Self::display(path),
            kind,
            size: if kind.is_dir() { 0 } else { meta.len() },
            mode: None,
            mtime: meta.modified().ok(),
        };

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            info.mode = Some(meta.permissions().mode());
        }

        info
    }

    async fn ensure_parent(path: &Path) -> VfsResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| VfsError::from_io(e, Self::display(parent)))?;
        }
        Ok(())
    }

    /// Copy a directory tree without recursion.
    async fn copy_tree(from: &Path, to: &Path) -> VfsResult<()> {
        let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];
        while let Some((src, dst)) = pending.pop() {
            fs::create_dir_all(&dst)
                .await
                .map_err(|e| VfsError::from_io(e, Self::display(&dst)))?;
            let mut dir = fs::read_dir(&src)
                .await
                .map_err(|e| VfsError::from_io(e, Self::display(&src)))?;
            while let Some(entry) = dir.next_entry().await.map_err(VfsError::from)? {
                let file_type = entry.file_type().await.map_err(VfsError::from)?;
                let target = dst.join(entry.file_name());
                if file_type.is_dir() {
                    pending.push((entry.path(), target));
                } else {
                    fs::copy(entry.path(), &target)
                        .await
                        .map_err(|e| VfsError::from_io(e, Self::display(&target)))?;
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl AsyncFs for LocalBackend {
    async fn info(&self, path: &str) -> VfsResult<EntryInfo> {
        let full_path = self.resolve(path)?;
        let meta = fs::metadata(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, Self::display(&full_path)))?;
        Ok(Self::metadata_to_info(&full_path, &meta))
    }

    async fn ls(&self, path: &str) -> VfsResult<Vec<EntryInfo>> {
        let full_path = self.resolve(path)?;
        let meta = fs::metadata(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, Self::display(&full_path)))?;
        if !meta.is_dir() {
            return Err(VfsError::not_a_directory(Self::display(&full_path)));
        }

        let mut entries = Vec::new();
        let mut dir = fs::read_dir(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, Self::display(&full_path)))?;

        while let Some(entry) = dir.next_entry().await.map_err(VfsError::from)? {
            let entry_path = entry.path();
            match entry.metadata().await {
                Ok(meta) => entries.push(Self::metadata_to_info(&entry_path, &meta)),
                // Entry vanished between readdir and stat
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(VfsError::from(e)),
            }
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn cat(&self, path: &str) -> VfsResult<Vec<u8>> {
        let full_path = self.resolve(path)?;
        if fs::metadata(&full_path).await.is_ok_and(|m| m.is_dir()) {
            return Err(VfsError::is_a_directory(Self::display(&full_path)));
        }
        fs::read(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, Self::display(&full_path)))
    }

    async fn cat_range(&self, path: &str, start: u64, end: Option<u64>) -> VfsResult<Vec<u8>> {
        use tokio::io::{AsyncReadExt, AsyncSeekExt};

        let full_path = self.resolve(path)?;
        let mut file = fs::File::open(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, Self::display(&full_path)))?;

        file.seek(std::io::SeekFrom::Start(start))
            .await
            .map_err(VfsError::from)?;

        let mut buffer = Vec::new();
        match end {
            Some(end) => {
                let len = end.saturating_sub(start);
                file.take(len)
                    .read_to_end(&mut buffer)
                    .await
                    .map_err(VfsError::from)?;
            }
            None => {
                file.read_to_end(&mut buffer).await.map_err(VfsError::from)?;
            }
        }
        Ok(buffer)
    }

    async fn pipe(&self, path: &str, data: &[u8]) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        Self::ensure_parent(&full_path).await?;
        fs::write(&full_path, data)
            .await
            .map_err(|e| VfsError::from_io(e, Self::display(&full_path)))
    }

    async fn touch(&self, path: &str) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        Self::ensure_parent(&full_path).await?;
        fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, Self::display(&full_path)))?;
        Ok(())
    }

    async fn mkdir(&self, path: &str, exist_ok: bool) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;

        if let Ok(meta) = fs::metadata(&full_path).await {
            return if meta.is_dir() && exist_ok {
                Ok(())
            } else {
                Err(VfsError::already_exists(Self::display(&full_path)))
            };
        }

        fs::create_dir_all(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, Self::display(&full_path)))
    }

    async fn rm(&self, path: &str, recursive: bool) -> VfsResult<()> {
        self.check_writable()?;
        let full_path = self.resolve(path)?;
        if full_path == self.root || full_path == self.canonical_root {
            return Err(VfsError::permission_denied("cannot remove backend root"));
        }

        let meta = fs::symlink_metadata(&full_path)
            .await
            .map_err(|e| VfsError::from_io(e, Self::display(&full_path)))?;
        let result = if !meta.is_dir() {
            fs::remove_file(&full_path).await
        } else if recursive {
            fs::remove_dir_all(&full_path).await
        } else {
            fs::remove_dir(&full_path).await
        };
        result.map_err(|e| VfsError::from_io(e, Self::display(&full_path)))
    }

    async fn mv(&self, from: &str, to: &str) -> VfsResult<()> {
        self.check_writable()?;
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;

        // Ensure parent of destination exists
        Self::ensure_parent(&to_path).await?;

        fs::rename(&from_path, &to_path)
            .await
            .map_err(|e| VfsError::from_io(e, Self::display(&from_path)))
    }

    async fn copy(&self, from: &str, to: &str) -> VfsResult<()> {
        self.check_writable()?;
        let from_path = self.resolve(from)?;
        let to_path = self.resolve(to)?;
        if to_path.starts_with(&from_path) && to_path != from_path {
            return Err(VfsError::invalid_path(format!(
                "cannot copy {} into itself",
                from_path.display()
            )));
        }

        let meta = fs::metadata(&from_path)
            .await
            .map_err(|e| VfsError::from_io(e, Self::display(&from_path)))?;
        if meta.is_dir() {
            return Self::copy_tree(&from_path, &to_path).await;
        }

        Self::ensure_parent(&to_path).await?;
        fs::copy(&from_path, &to_path)
            .await
            .map_err(|e| VfsError::from_io(e, Self::display(&to_path)))?;
        Ok(())
    }

    fn read_only(&self) -> bool {
        self.read_only
    }
}
