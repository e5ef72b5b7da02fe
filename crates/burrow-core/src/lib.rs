//! # burrow-core
//!
//! Core types and utilities shared across all Burrow crates.
//!
//! This crate provides:
//! - `Version` with loose semantic-version parsing and ordering
//! - `PackageRecord` and `VersionManifest`, the cached package document
//! - `BurrowError` enum for unified error handling
//! - `TarballStream` / `TarballUpload` for streaming blob transfers
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `types`: Core data types (Version, PackageRecord, etc.)
//! - `error`: Error types and result aliases
//! - `stream`: Cancellable, backpressure-aware tarball transfers

pub mod error;
pub mod stream;
pub mod types;

// Re-export commonly used types
pub use error::{BurrowError, BurrowResult};
pub use stream::{AbortHandle, ByteStream, TarballStream, TarballUpload, TransferState, UploadEvent, UploadReceiver};
pub use types::{Attachment, PackageRecord, UplinkMark, Version, VersionError, VersionManifest};
