//! Reference drivers.
//!
//! [`LocalBackend`] is natively asynchronous; [`MemoryBackend`] is blocking
//! and reaches callers through [`BlockingAdapter`](crate::BlockingAdapter).

mod local;
mod memory;

pub use local::LocalBackend;
pub use memory::{MemoryBackend, MemoryStore};
