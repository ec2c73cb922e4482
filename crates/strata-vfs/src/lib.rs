//! # strata-vfs
//!
//! Storage driver abstraction for strata.
//!
//! - [`AsyncFs`] - Capability interface every caller programs against
//! - [`SyncFs`] - The same interface for blocking drivers
//! - [`BlockingAdapter`] - Presents a [`SyncFs`] as an [`AsyncFs`]
//! - [`MemoryBackend`] - Virtual in-memory filesystem over a shared [`MemoryStore`]
//! - [`LocalBackend`] - Local disk access (with path security)
//!
//! ## Design Decisions
//!
//! - **Backend-native string paths**: drivers take whatever their storage
//!   calls a path (OS path, memory key, object key). Translating logical
//!   paths is the registry's job, not the driver's.
//! - **Full names in listings**: [`EntryInfo::name`] is the full backend path,
//!   so the registry can re-root listings without extra lookups.
//! - **One calling convention**: blocking drivers are wrapped once at
//!   construction; nothing downstream branches on driver capability.

pub mod backends;
mod blocking;
mod error;
mod ops;
mod types;

pub use backends::{LocalBackend, MemoryBackend, MemoryStore};
pub use blocking::BlockingAdapter;
pub use error::{VfsError, VfsResult};
pub use ops::{AsyncFs, SyncFs, slice_range};
pub use types::{EntryInfo, FileType};
