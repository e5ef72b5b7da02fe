//! Core data types for Burrow.
//!
//! This module provides the fundamental types used throughout the proxy:
//! - Version type with loose semantic-version parsing
//! - Package record structures as stored locally and served by uplinks

pub mod record;
pub mod version;

// Re-export all public types
pub use record::{Attachment, PackageRecord, UplinkMark, VersionManifest, LATEST_TAG};
pub use version::{Version, VersionError};
