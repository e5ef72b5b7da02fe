//! Package storage for the Burrow registry proxy
//!
//! This crate defines the contract every storage backend satisfies
//! (metadata documents plus streamed tarball blobs) and ships the
//! in-memory reference backend.

pub mod lock;
pub mod manager;
pub mod memory;

// Re-export main types
pub use lock::{KeyGuard, KeyedLocks};
pub use manager::{PackageStorage, RecordTransform, RecordWriter};
pub use memory::MemoryStorage;

use burrow_core::error::BurrowError;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, BurrowError>;
