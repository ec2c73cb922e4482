//! The hot-swapped registry owner.
//!
//! [`FilesystemManager`] holds the current [`Registry`] behind one
//! `Arc`. Readers clone the `Arc` and keep using their snapshot for as long
//! as they like; a reload builds a complete new registry off to the side and
//! swaps it in with a single pointer store.

use std::sync::Arc;

use parking_lot::RwLock;
use strata_vfs::EntryInfo;
use tracing::{debug, error, info, warn};

use crate::config::{Config, ConfigLoader};
use crate::error::{ConfigError, RegistryResult};
use crate::factory::{BackendFactory, DriverTable};
use crate::registry::{BackendEntry, FilesystemInfo, Registry};
use crate::resolver::{RequestKind, Resolved};

/// Owns the config loader, the driver table and the live registry.
pub struct FilesystemManager {
    loader: ConfigLoader,
    factory: BackendFactory,
    current: RwLock<Arc<Registry>>,
    /// Serializes rebuilds; readers never take it.
    reload: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for FilesystemManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilesystemManager")
            .field("config", &self.loader.path())
            .field("registry", &self.snapshot())
            .finish()
    }
}

impl FilesystemManager {
    /// Load the config and build the first registry.
    ///
    /// Never fails: an unusable config is logged and yields an empty
    /// registry, so the service can start and pick up a fixed file later.
    pub async fn open(loader: ConfigLoader, drivers: DriverTable) -> Self {
        let factory = BackendFactory::new(drivers);
        let config = match loader.load().await {
            Ok(config) => config,
            Err(e) => {
                error!(path = %loader.path().display(), error = %e, "failed to load config, starting empty");
                Config::default()
            }
        };
        let registry = Registry::build(Arc::new(config), &factory).await;
        info!(
            path = %loader.path().display(),
            sources = registry.len(),
            "filesystem registry ready"
        );
        Self {
            loader,
            factory,
            current: RwLock::new(Arc::new(registry)),
            reload: tokio::sync::Mutex::new(()),
        }
    }

    pub fn loader(&self) -> &ConfigLoader {
        &self.loader
    }

    pub fn drivers(&self) -> &DriverTable {
        self.factory.drivers()
    }

    /// The current registry generation.
    pub fn snapshot(&self) -> Arc<Registry> {
        Arc::clone(&self.current.read())
    }

    pub fn get_filesystem(&self, name: &str) -> Option<Arc<BackendEntry>> {
        self.snapshot().get(name).cloned()
    }

    pub fn get_filesystem_by_protocol(&self, protocol: &str) -> Option<Arc<BackendEntry>> {
        self.snapshot().get_by_protocol(protocol).cloned()
    }

    /// See [`Registry::validate`].
    pub fn validate(&self, kind: RequestKind, key: &str, path: &str) -> RegistryResult<Resolved> {
        self.snapshot().validate(kind, key, path)
    }

    /// See [`Registry::map_paths`].
    pub fn map_paths(
        &self,
        root_path: &str,
        key: &str,
        listing: Vec<EntryInfo>,
    ) -> RegistryResult<Vec<EntryInfo>> {
        self.snapshot().map_paths(root_path, key, listing)
    }

    /// Reload the config and rebuild the registry if its content changed.
    ///
    /// On error the current registry stays in place.
    pub async fn check_reload_config(&self) -> Result<Arc<Config>, ConfigError> {
        let _guard = self.reload.lock().await;

        let config = self.loader.load().await?;
        let current = self.snapshot();
        if config.hash() == current.hash() {
            debug!(hash = %config.hash(), "config unchanged");
            return Ok(Arc::clone(current.config()));
        }

        let config = Arc::new(config);
        let registry = Registry::build(Arc::clone(&config), &self.factory).await;
        let sources = registry.len();
        *self.current.write() = Arc::new(registry);
        info!(
            previous = %current.hash(),
            hash = %config.hash(),
            sources,
            "rebuilt filesystem registry"
        );
        Ok(config)
    }

    /// Summaries of every filesystem, after picking up config changes.
    pub async fn list_filesystems(&self) -> Vec<FilesystemInfo> {
        if let Err(e) = self.check_reload_config().await {
            warn!(error = %e, "config reload failed, listing last good registry");
        }
        self.snapshot().infos()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn manager_with(text: &str) -> (TempDir, FilesystemManager) {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("sources.yaml");
        std::fs::write(&path, text).unwrap();
        let manager = FilesystemManager::open(ConfigLoader::new(path), DriverTable::default()).await;
        (tmp, manager)
    }

    #[tokio::test]
    async fn test_open_builds_registry() {
        let (_tmp, manager) = manager_with("sources:\n  - name: m\n    path: memory://m\n").await;
        let entry = manager.get_filesystem("m").unwrap();
        assert_eq!(entry.canonical_path, "memory://m");
        assert_eq!(manager.get_filesystem_by_protocol("memory").unwrap().name, "m");
        assert!(manager.get_filesystem("x").is_none());
    }

    #[tokio::test]
    async fn test_open_survives_malformed_config() {
        let (_tmp, manager) = manager_with("sources: 12\n").await;
        assert!(manager.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_reload_keeps_last_good_registry() {
        let (tmp, manager) = manager_with("sources:\n  - name: m\n    path: memory://m\n").await;
        std::fs::write(tmp.path().join("sources.yaml"), "sources: {}\n").unwrap();

        let err = manager.check_reload_config().await.unwrap_err();
        assert!(matches!(err, ConfigError::Malformed { .. }));
        assert!(manager.get_filesystem("m").is_some());

        let infos = manager.list_filesystems().await;
        assert_eq!(infos.len(), 1);
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let (tmp, manager) = manager_with("sources:\n  - name: a\n    path: memory://a\n").await;
        std::fs::write(
            tmp.path().join("sources.yaml"),
            "sources:\n  - name: b\n    path: memory://b\n",
        )
        .unwrap();

        let config = manager.check_reload_config().await.unwrap();
        assert_eq!(config.sources()[0].name, "b");
        assert!(manager.get_filesystem("a").is_none());
        assert!(manager.get_filesystem("b").is_some());
    }
}
