//! # strata-registry
//!
//! Config-driven registry of named filesystems.
//!
//! A YAML sources file names each filesystem and says where it lives. The
//! registry builds one backend per source, resolves `(key, path)` requests
//! into backend-native paths, and hot-swaps itself when the file changes.
//!
//! - [`ConfigLoader`] - Reads and validates the sources file
//! - [`DriverTable`] / [`BackendFactory`] - Protocol dispatch and backend construction
//! - [`Registry`] - One immutable generation of name → backend entries
//! - [`FilesystemManager`] - Owns the live registry and reloads it
//! - [`FilesystemService`] - Request-level file operations
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use strata_registry::{ConfigLoader, DriverTable, FilesystemManager, FilesystemService};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let loader = ConfigLoader::from_default_location()?;
//! let manager = Arc::new(FilesystemManager::open(loader, DriverTable::default()).await);
//! let service = FilesystemService::new(Arc::clone(&manager));
//!
//! let listing = service.get("scratch", "").await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
pub mod factory;
mod manager;
mod registry;
mod resolver;
mod service;

pub use config::{
    CONFIG_DIR_ENV, CONFIG_FILE_NAME, Config, ConfigLoader, DEFAULT_CONFIG, SourceRejection,
    SourceSpec,
};
pub use error::{ConfigError, RegistryError, RegistryResult};
pub use factory::{BackendFactory, Driver, DriverArgs, DriverTable};
pub use manager::FilesystemManager;
pub use registry::{BackendEntry, FilesystemInfo, Registry};
pub use resolver::{RequestKind, Resolved};
pub use service::{FileAction, FilesystemService, GetContent, parse_range};

pub use strata_vfs as vfs;
