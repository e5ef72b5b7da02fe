//! Configuration parsing for the Burrow registry proxy
//!
//! This crate handles parsing and validation of uplink settings, layering
//! global proxy settings under per-uplink ones and producing the immutable
//! `UplinkConfig` each uplink client is built from.

pub mod interval;
pub mod merge;
pub mod toml;
pub mod uplink;

// Re-export main types
pub use interval::{parse_interval, IntervalValue};
pub use merge::resolve_uplink;
pub use toml::{parse_registry_toml, GlobalSettings, RegistryToml};
pub use uplink::{
    AuthScheme, AuthSettings, NoProxy, TokenEnv, TokenSource, UplinkAuth, UplinkConfig, UplinkSettings,
};

use burrow_core::error::BurrowError;

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, BurrowError>;
