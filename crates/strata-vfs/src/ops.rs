//! Driver capability traits.
//!
//! Two flavors of the same interface: [`AsyncFs`] for natively asynchronous
//! drivers and [`SyncFs`] for blocking ones. Callers only ever hold
//! `Arc<dyn AsyncFs>`; blocking drivers reach them through
//! [`BlockingAdapter`](crate::BlockingAdapter).
//!
//! Paths are backend-native strings. The registry resolves logical paths
//! before they get here, so drivers see absolute OS paths, memory keys or
//! object keys and nothing else.

use async_trait::async_trait;

use super::types::EntryInfo;
use super::VfsResult;

/// Slice `data` to the half-open byte range `[start, end)`.
///
/// Out-of-bounds ranges clamp to the data, mirroring short reads at EOF.
pub fn slice_range(data: &[u8], start: u64, end: Option<u64>) -> Vec<u8> {
    let len = data.len();
    let start = usize::try_from(start).unwrap_or(usize::MAX).min(len);
    let end = end
        .map(|e| usize::try_from(e).unwrap_or(usize::MAX))
        .unwrap_or(len)
        .min(len);
    if start >= end {
        return Vec::new();
    }
    data[start..end].to_vec()
}

/// Asynchronous storage capability interface.
#[async_trait]
pub trait AsyncFs: Send + Sync {
    // ========================================================================
    // Reading
    // ========================================================================

    /// Metadata for a single path.
    async fn info(&self, path: &str) -> VfsResult<EntryInfo>;

    /// Direct children of a directory, sorted by name.
    async fn ls(&self, path: &str) -> VfsResult<Vec<EntryInfo>>;

    /// Whole file contents.
    async fn cat(&self, path: &str) -> VfsResult<Vec<u8>>;

    /// Bytes in `[start, end)`; `None` reads to EOF.
    async fn cat_range(&self, path: &str, start: u64, end: Option<u64>) -> VfsResult<Vec<u8>> {
        let data = self.cat(path).await?;
        Ok(slice_range(&data, start, end))
    }

    // ========================================================================
    // Writing
    // ========================================================================

    /// Replace a file's contents, creating it (and its parents) if needed.
    async fn pipe(&self, path: &str, data: &[u8]) -> VfsResult<()>;

    /// Create an empty file if none exists. Existing content is kept.
    async fn touch(&self, path: &str) -> VfsResult<()>;

    /// Create a directory and any missing parents.
    async fn mkdir(&self, path: &str, exist_ok: bool) -> VfsResult<()>;

    /// Remove a file, or a directory (children too when `recursive`).
    async fn rm(&self, path: &str, recursive: bool) -> VfsResult<()>;

    /// Move a file or directory tree.
    async fn mv(&self, from: &str, to: &str) -> VfsResult<()>;

    /// Copy a file or directory tree.
    async fn copy(&self, from: &str, to: &str) -> VfsResult<()>;

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Returns true if this backend rejects writes.
    fn read_only(&self) -> bool;

    /// Check if a path exists.
    async fn exists(&self, path: &str) -> bool {
        self.info(path).await.is_ok()
    }

    /// Check if a path is an existing directory.
    async fn isdir(&self, path: &str) -> bool {
        matches!(self.info(path).await, Ok(info) if info.is_dir())
    }
}

/// Blocking storage capability interface.
///
/// Same contract as [`AsyncFs`]; every call may block the calling thread.
pub trait SyncFs: Send + Sync {
    /// Metadata for a single path.
    fn info(&self, path: &str) -> VfsResult<EntryInfo>;

    /// Direct children of a directory, sorted by name.
    fn ls(&self, path: &str) -> VfsResult<Vec<EntryInfo>>;

    /// Whole file contents.
    fn cat(&self, path: &str) -> VfsResult<Vec<u8>>;

    /// Bytes in `[start, end)`; `None` reads to EOF.
    fn cat_range(&self, path: &str, start: u64, end: Option<u64>) -> VfsResult<Vec<u8>> {
        let data = self.cat(path)?;
        Ok(slice_range(&data, start, end))
    }

    /// Replace a file's contents, creating it (and its parents) if needed.
    fn pipe(&self, path: &str, data: &[u8]) -> VfsResult<()>;

    /// Create an empty file if none exists.
    fn touch(&self, path: &str) -> VfsResult<()>;

    /// Create a directory and any missing parents.
    fn mkdir(&self, path: &str, exist_ok: bool) -> VfsResult<()>;

    /// Remove a file or directory.
    fn rm(&self, path: &str, recursive: bool) -> VfsResult<()>;

    /// Move a file or directory tree.
    fn mv(&self, from: &str, to: &str) -> VfsResult<()>;

    /// Copy a file or directory tree.
    fn copy(&self, from: &str, to: &str) -> VfsResult<()>;

    /// Returns true if this backend rejects writes.
    fn read_only(&self) -> bool;

    /// Check if a path exists.
    fn exists(&self, path: &str) -> bool {
        self.info(path).is_ok()
    }

    /// Check if a path is an existing directory.
    fn isdir(&self, path: &str) -> bool {
        matches!(self.info(path), Ok(info) if info.is_dir())
    }
}
