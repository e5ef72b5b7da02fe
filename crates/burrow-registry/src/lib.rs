//! Uplink client for the Burrow registry proxy
//!
//! This crate talks to upstream registries: it fetches package metadata
//! and tarballs, streams search results, builds auth and proxy headers, and
//! tracks each uplink's health with a circuit breaker so an unreachable
//! upstream is skipped instead of timing out every request.

pub mod api;
pub mod auth;
pub mod cache;
pub mod circuit;
pub mod client;
pub mod proxy;
pub mod search;

// Re-export main types
pub use api::{ClientInfo, MetadataOptions, RemoteMetadata, SearchObject, SearchPackage, SearchQuery, TarballOptions};
pub use auth::{apply_auth, resolve_token, EnvSource, ProcessEnv};
pub use cache::UplinkFreshness;
pub use circuit::{CircuitBreaker, CircuitState};
pub use client::UplinkClient;
pub use proxy::should_bypass_proxy;
pub use search::SearchStream;

use burrow_core::error::BurrowError;

/// Result type for registry operations
pub type RegistryResult<T> = Result<T, BurrowError>;
