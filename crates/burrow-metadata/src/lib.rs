//! Package metadata handling for the Burrow registry proxy
//!
//! This crate orders version strings, picks a package's latest version and
//! merges package records fetched from uplinks into the locally cached copy.

pub mod merge;
pub mod semver;

// Re-export main types
pub use merge::merge_versions;
pub use semver::{resolve_latest, sort_versions};

use burrow_core::error::BurrowError;

/// Result type for metadata operations
pub type MetadataResult<T> = Result<T, BurrowError>;
