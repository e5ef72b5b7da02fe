//! Registry TOML parsing

use std::collections::BTreeMap;

use burrow_core::error::BurrowError;
use serde::{Deserialize, Serialize};

use crate::merge::resolve_uplink;
use crate::uplink::{NoProxy, UplinkConfig, UplinkSettings};
use crate::ConfigResult;

/// Complete registry proxy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryToml {
    /// Settings shared by every uplink
    #[serde(flatten)]
    pub global: GlobalSettings,

    /// Upstream registries by name
    #[serde(default)]
    pub uplinks: BTreeMap<String, UplinkSettings>,
}

/// Top-level settings that uplinks inherit
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalSettings {
    /// Sent to uplinks as `npm (<user_agent>)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,

    /// Identifies this proxy in `Via` headers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<NoProxy>,
}

impl RegistryToml {
    /// Resolve every uplink, in name order
    pub fn uplink_configs(&self) -> ConfigResult<Vec<UplinkConfig>> {
        self.uplinks
            .iter()
            .map(|(name, settings)| resolve_uplink(name, settings, &self.global))
            .collect()
    }

    /// Resolve a single uplink by name
    pub fn uplink_config(&self, name: &str) -> ConfigResult<UplinkConfig> {
        let settings = self.uplinks.get(name).ok_or_else(|| BurrowError::ConfigValidation {
            field: format!("uplinks.{}", name),
            reason: "no such uplink".to_string(),
        })?;
        resolve_uplink(name, settings, &self.global)
    }
}

/// Parse registry TOML from a string
pub fn parse_registry_toml(content: &str) -> ConfigResult<RegistryToml> {
    toml::from_str(content).map_err(|e| {
        let (line, column) = e
            .span()
            .map(|span| line_column(content, span.start))
            .unwrap_or((0, 0));
        BurrowError::TomlParse {
            message: e.message().to_string(),
            line,
            column,
        }
    })
}

/// 1-based line and column of a byte offset
fn line_column(content: &str, offset: usize) -> (usize, usize) {
    let prefix = &content[..offset.min(content.len())];
    let line = prefix.matches('\n').count() + 1;
    let column = prefix.rfind('\n').map_or(prefix.len(), |nl| prefix.len() - nl - 1) + 1;
    (line, column)
}
