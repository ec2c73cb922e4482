//! Backend construction.
//!
//! A [`DriverTable`] maps protocol names to factory closures. The
//! [`BackendFactory`] turns one [`SourceSpec`] into a [`BackendEntry`]:
//! infer the protocol, derive the root, call the driver factory, and wrap
//! blocking drivers so every entry exposes the same async interface.
//! Construction failures land on the entry instead of aborting the build.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use strata_vfs::{
    AsyncFs, BlockingAdapter, LocalBackend, MemoryBackend, MemoryStore, SyncFs, VfsError,
    VfsResult,
};
use tracing::{debug, warn};

use crate::config::SourceSpec;
use crate::registry::BackendEntry;
use crate::resolver::normalize_lexically;

/// Protocol used when neither the source nor its path names one.
pub const DEFAULT_PROTOCOL: &str = "file";

// ============================================================================
// Protocol and root derivation
// ============================================================================

/// Split `scheme://rest` into its scheme and remainder.
///
/// Strings without a valid scheme come back whole.
pub fn split_protocol(path: &str) -> (Option<&str>, &str) {
    match path.find("://") {
        Some(idx) if is_scheme(&path[..idx]) => (Some(&path[..idx]), &path[idx + 3..]),
        _ => (None, path),
    }
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Lower-case a protocol name and resolve aliases.
pub fn canonical_protocol(protocol: &str) -> String {
    let lower = protocol.trim().to_ascii_lowercase();
    match lower.as_str() {
        "local" => DEFAULT_PROTOCOL.to_string(),
        _ => lower,
    }
}

/// Explicit protocol, else the path's scheme, else [`DEFAULT_PROTOCOL`].
pub fn infer_protocol(explicit: Option<&str>, path: &str) -> String {
    match explicit {
        Some(protocol) => canonical_protocol(protocol),
        None => split_protocol(path)
            .0
            .map(canonical_protocol)
            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string()),
    }
}

/// Protocols whose paths the resolver anchors under the backend root.
pub fn is_local_protocol(protocol: &str) -> bool {
    matches!(protocol, "file" | "memory")
}

/// Backend-native root for a configured path.
pub fn derive_root(protocol: &str, path: &str) -> String {
    let (_, stripped) = split_protocol(path);
    match protocol {
        "memory" => stripped.trim_matches('/').to_string(),
        "file" => {
            let expanded = shellexpand::tilde(stripped);
            let absolute = absolute_root(&expanded);
            match absolute.trim_end_matches('/') {
                "" => "/".to_string(),
                root => root.to_string(),
            }
        }
        _ => stripped.trim_end_matches('/').to_string(),
    }
}

/// Anchor a relative local root at the working directory and fold `.`/`..`.
///
/// The resolver and [`LocalBackend`] both compare against this string, so it
/// has to be absolute for them to agree.
fn absolute_root(path: &str) -> String {
    let absolute = match std::path::absolute(path) {
        Ok(absolute) => absolute,
        Err(e) => {
            warn!(path, error = %e, "cannot make local root absolute");
            return path.to_string();
        }
    };
    normalize_lexically(&absolute)
        .unwrap_or(absolute)
        .to_string_lossy()
        .into_owned()
}

// ============================================================================
// Drivers
// ============================================================================

/// What a driver factory produces.
pub enum Driver {
    /// Natively asynchronous driver.
    Async(Arc<dyn AsyncFs>),
    /// Blocking driver; wrapped before use.
    Sync(Arc<dyn SyncFs>),
}

impl Driver {
    pub fn is_async(&self) -> bool {
        matches!(self, Driver::Async(_))
    }

    /// Unify to the async interface.
    pub fn into_async(self) -> Arc<dyn AsyncFs> {
        match self {
            Driver::Async(fs) => fs,
            Driver::Sync(fs) => Arc::new(BlockingAdapter::new(fs)),
        }
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Driver::Async(_) => f.write_str("Driver::Async"),
            Driver::Sync(_) => f.write_str("Driver::Sync"),
        }
    }
}

/// Inputs handed to a driver factory.
#[derive(Debug, Clone, Copy)]
pub struct DriverArgs<'a> {
    pub protocol: &'a str,
    /// Derived backend root.
    pub root: &'a str,
    pub args: &'a [Value],
    pub kwargs: &'a Map<String, Value>,
}

impl DriverArgs<'_> {
    /// Reject positional args and any kwarg outside `allowed`.
    pub fn expect_only(&self, allowed: &[&str]) -> VfsResult<()> {
        if !self.args.is_empty() {
            return Err(VfsError::invalid_argument(format!(
                "{} driver takes no positional arguments",
                self.protocol
            )));
        }
        if let Some(key) = self.kwargs.keys().find(|k| !allowed.contains(&k.as_str())) {
            return Err(VfsError::invalid_argument(format!(
                "{} driver does not accept `{key}`",
                self.protocol
            )));
        }
        Ok(())
    }

    /// A boolean kwarg, defaulting to false.
    pub fn flag(&self, key: &str) -> VfsResult<bool> {
        match self.kwargs.get(key) {
            None | Some(Value::Null) => Ok(false),
            Some(Value::Bool(b)) => Ok(*b),
            Some(other) => Err(VfsError::invalid_argument(format!(
                "`{key}` must be a boolean, got {other}"
            ))),
        }
    }
}

/// Factory closure for one protocol.
pub type DriverFactory = Arc<dyn Fn(&DriverArgs<'_>) -> VfsResult<Driver> + Send + Sync>;

/// Protocol name to driver factory.
///
/// The table owns the [`MemoryStore`] behind every `memory` source, so
/// memory contents outlive registry rebuilds.
pub struct DriverTable {
    factories: HashMap<String, DriverFactory>,
    memory_store: Arc<MemoryStore>,
}

impl Default for DriverTable {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for DriverTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverTable")
            .field("protocols", &self.protocols())
            .finish()
    }
}

impl DriverTable {
    /// A table with no drivers.
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
            memory_store: Arc::new(MemoryStore::new()),
        }
    }

    /// A table with the `file` and `memory` drivers.
    pub fn with_builtins() -> Self {
        let mut table = Self::empty();

        table.register("file", |args: &DriverArgs<'_>| {
            args.expect_only(&["read_only"])?;
            let mut backend = LocalBackend::new(args.root);
            backend.set_read_only(args.flag("read_only")?);
            Ok(Driver::Async(Arc::new(backend)))
        });

        let store = Arc::clone(&table.memory_store);
        table.register("memory", move |args: &DriverArgs<'_>| {
            args.expect_only(&[])?;
            Ok(Driver::Sync(Arc::new(MemoryBackend::with_store(
                Arc::clone(&store),
            ))))
        });

        table
    }

    /// Register (or replace) the driver for a protocol.
    pub fn register<F>(&mut self, protocol: &str, factory: F)
    where
        F: Fn(&DriverArgs<'_>) -> VfsResult<Driver> + Send + Sync + 'static,
    {
        self.factories
            .insert(canonical_protocol(protocol), Arc::new(factory));
    }

    /// Registered protocol names, sorted.
    pub fn protocols(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn contains(&self, protocol: &str) -> bool {
        self.factories.contains_key(&canonical_protocol(protocol))
    }

    /// The store shared by every `memory` driver.
    pub fn memory_store(&self) -> &Arc<MemoryStore> {
        &self.memory_store
    }

    /// Run the factory for `args.protocol`.
    pub fn construct(&self, args: &DriverArgs<'_>) -> VfsResult<Driver> {
        let factory = self
            .factories
            .get(args.protocol)
            .ok_or_else(|| VfsError::UnknownProtocol(args.protocol.to_string()))?;
        factory(args)
    }
}

// ============================================================================
// Backend factory
// ============================================================================

/// Builds registry entries from sources.
#[derive(Debug, Default)]
pub struct BackendFactory {
    drivers: DriverTable,
}

impl BackendFactory {
    pub fn new(drivers: DriverTable) -> Self {
        Self { drivers }
    }

    pub fn drivers(&self) -> &DriverTable {
        &self.drivers
    }

    /// Build the entry for one source. Never fails; errors are recorded on
    /// the entry.
    pub async fn build(&self, spec: &SourceSpec) -> BackendEntry {
        let protocol = infer_protocol(spec.protocol.as_deref(), &spec.path);
        let root_path = derive_root(&protocol, &spec.path);
        let canonical_path = format!("{protocol}://{root_path}");

        let args = DriverArgs {
            protocol: &protocol,
            root: &root_path,
            args: &spec.args,
            kwargs: &spec.kwargs,
        };

        let outcome = self.instantiate(&args).await;

        let mut entry = BackendEntry {
            name: spec.name.clone(),
            protocol,
            path_url: spec.path.clone(),
            root_path,
            canonical_path,
            is_async: false,
            instance: None,
            error: None,
        };

        match outcome {
            Ok((fs, is_async)) => {
                debug!(
                    name = %entry.name,
                    protocol = %entry.protocol,
                    root = %entry.root_path,
                    is_async,
                    "constructed backend"
                );
                entry.is_async = is_async;
                entry.instance = Some(fs);
            }
            Err(e) => {
                warn!(
                    name = %entry.name,
                    protocol = %entry.protocol,
                    error = %e,
                    "failed to construct backend"
                );
                entry.error = Some(Arc::new(e));
            }
        }
        entry
    }
}

impl BackendFactory {
    async fn instantiate(&self, args: &DriverArgs<'_>) -> VfsResult<(Arc<dyn AsyncFs>, bool)> {
        let driver = self.drivers.construct(args)?;
        let is_async = driver.is_async();
        let fs = driver.into_async();
        prepare_root(args.protocol, args.root, fs.as_ref()).await?;
        Ok((fs, is_async))
    }
}

/// Memory roots are created up front so listings of a fresh source work.
async fn prepare_root(protocol: &str, root: &str, fs: &dyn AsyncFs) -> VfsResult<()> {
    if protocol == "memory" && !root.is_empty() && !fs.isdir(root).await {
        fs.mkdir(root, true).await?;
    }
    Ok(())
}
