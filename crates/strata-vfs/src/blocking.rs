//! Async adapter over blocking drivers.
//!
//! Each call is shipped to tokio's blocking pool with
//! [`tokio::task::spawn_blocking`], so a slow synchronous driver never stalls
//! the executor's worker threads.

use async_trait::async_trait;
use std::sync::Arc;

use super::ops::{AsyncFs, SyncFs};
use super::types::EntryInfo;
use super::{VfsError, VfsResult};

/// Presents a [`SyncFs`] as an [`AsyncFs`].
#[derive(Clone)]
pub struct BlockingAdapter {
    inner: Arc<dyn SyncFs>,
}

impl std::fmt::Debug for BlockingAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingAdapter")
            .field("read_only", &self.inner.read_only())
            .finish()
    }
}

impl BlockingAdapter {
    /// Wrap a blocking driver.
    pub fn new(inner: Arc<dyn SyncFs>) -> Self {
        Self { inner }
    }

    /// Run one driver call on the blocking pool.
    async fn run<T, F>(&self, f: F) -> VfsResult<T>
    where
        F: FnOnce(&dyn SyncFs) -> VfsResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(inner.as_ref()))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "blocking driver call panicked or was cancelled");
                VfsError::other(format!("blocking task join error: {e}"))
            })?
    }
}

#[async_trait]
impl AsyncFs for BlockingAdapter {
    async fn info(&self, path: &str) -> VfsResult<EntryInfo> {
        let path = path.to_owned();
        self.run(move |fs| fs.info(&path)).await
    }

    async fn ls(&self, path: &str) -> VfsResult<Vec<EntryInfo>> {
        let path = path.to_owned();
        self.run(move |fs| fs.ls(&path)).await
    }

    async fn cat(&self, path: &str) -> VfsResult<Vec<u8>> {
        let path = path.to_owned();
        self.run(move |fs| fs.cat(&path)).await
    }

    async fn cat_range(&self, path: &str, start: u64, end: Option<u64>) -> VfsResult<Vec<u8>> {
        let path = path.to_owned();
        self.run(move |fs| fs.cat_range(&path, start, end)).await
    }

    async fn pipe(&self, path: &str, data: &[u8]) -> VfsResult<()> {
        let path = path.to_owned();
        let data = data.to_vec();
        self.run(move |fs| fs.pipe(&path, &data)).await
    }

    async fn touch(&self, path: &str) -> VfsResult<()> {
        let path = path.to_owned();
        self.run(move |fs| fs.touch(&path)).await
    }

    async fn mkdir(&self, path: &str, exist_ok: bool) -> VfsResult<()> {
        let path = path.to_owned();
        self.run(move |fs| fs.mkdir(&path, exist_ok)).await
    }

    async fn rm(&self, path: &str, recursive: bool) -> VfsResult<()> {
        let path = path.to_owned();
        self.run(move |fs| fs.rm(&path, recursive)).await
    }

    async fn mv(&self, from: &str, to: &str) -> VfsResult<()> {
        let (from, to) = (from.to_owned(), to.to_owned());
        self.run(move |fs| fs.mv(&from, &to)).await
    }

    async fn copy(&self, from: &str, to: &str) -> VfsResult<()> {
        let (from, to) = (from.to_owned(), to.to_owned());
        self.run(move |fs| fs.copy(&from, &to)).await
    }

    fn read_only(&self) -> bool {
        self.inner.read_only()
    }

    async fn exists(&self, path: &str) -> bool {
        let path = path.to_owned();
        self.run(move |fs| Ok(fs.exists(&path))).await.unwrap_or(false)
    }

    async fn isdir(&self, path: &str) -> bool {
        let path = path.to_owned();
        self.run(move |fs| Ok(fs.isdir(&path))).await.unwrap_or(false)
    }
}
