//! Immutable registry snapshots.
//!
//! One [`Registry`] is built per config generation and never edited
//! afterwards. Hot reload replaces the whole snapshot.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::Serialize;
use strata_vfs::{AsyncFs, VfsError};

use crate::config::Config;
use crate::factory::{BackendFactory, canonical_protocol, is_local_protocol};

/// One configured filesystem.
pub struct BackendEntry {
    /// Key clients address the filesystem by.
    pub name: String,
    pub protocol: String,
    /// The configured path, verbatim.
    pub path_url: String,
    /// Protocol-stripped backend root.
    pub root_path: String,
    /// `{protocol}://{root_path}`.
    pub canonical_path: String,
    /// Whether the driver was natively async.
    pub is_async: bool,
    /// Live backend; `None` when construction failed.
    pub instance: Option<Arc<dyn AsyncFs>>,
    /// Construction failure, if any.
    pub error: Option<Arc<VfsError>>,
}

impl BackendEntry {
    /// Whether the resolver anchors paths under the root for this backend.
    pub fn is_local(&self) -> bool {
        is_local_protocol(&self.protocol)
    }

    pub fn is_available(&self) -> bool {
        self.instance.is_some()
    }

    /// Serializable summary.
    pub fn info(&self) -> FilesystemInfo {
        FilesystemInfo {
            key: self.name.clone(),
            name: self.name.clone(),
            protocol: self.protocol.clone(),
            path: self.root_path.clone(),
            path_url: self.path_url.clone(),
            canonical_path: self.canonical_path.clone(),
            is_async: self.is_async,
            error: self.error.as_ref().map(|e| e.to_string()),
        }
    }
}

impl fmt::Debug for BackendEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendEntry")
            .field("name", &self.name)
            .field("protocol", &self.protocol)
            .field("root_path", &self.root_path)
            .field("canonical_path", &self.canonical_path)
            .field("is_async", &self.is_async)
            .field("available", &self.is_available())
            .field("error", &self.error)
            .finish()
    }
}

/// What clients see when they list filesystems.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilesystemInfo {
    pub key: String,
    pub name: String,
    pub protocol: String,
    /// Backend root.
    pub path: String,
    pub path_url: String,
    pub canonical_path: String,
    pub is_async: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Name-to-backend map for one config generation.
pub struct Registry {
    entries: IndexMap<String, Arc<BackendEntry>>,
    config: Arc<Config>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("hash", &self.hash())
            .field("entries", &self.entries.values().collect::<Vec<_>>())
            .finish()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::empty()
    }
}

impl Registry {
    /// A registry with no sources.
    pub fn empty() -> Self {
        Self {
            entries: IndexMap::new(),
            config: Arc::new(Config::default()),
        }
    }

    /// Build one entry per source, in config order.
    ///
    /// Source names are unique; [`Config`] drops repeats before they get here.
    pub async fn build(config: Arc<Config>, factory: &BackendFactory) -> Self {
        let mut entries = IndexMap::with_capacity(config.sources().len());
        for spec in config.sources() {
            let entry = factory.build(spec).await;
            entries.insert(spec.name.clone(), Arc::new(entry));
        }
        Self { entries, config }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<BackendEntry>> {
        self.entries.get(name)
    }

    /// First entry in config order using `protocol`.
    pub fn get_by_protocol(&self, protocol: &str) -> Option<&Arc<BackendEntry>> {
        let protocol = canonical_protocol(protocol);
        self.entries.values().find(|e| e.protocol == protocol)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Source names in config order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<BackendEntry>> {
        self.entries.values()
    }

    /// The config this snapshot was built from.
    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn hash(&self) -> &str {
        self.config.hash()
    }

    /// Summaries of every entry, in config order.
    pub fn infos(&self) -> Vec<FilesystemInfo> {
        self.iter().map(|e| e.info()).collect()
    }
}
