//! Uplink settings as written in config, and the resolved `UplinkConfig`

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use burrow_core::error::BurrowError;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::interval::IntervalValue;

/// Freshness window for uplink metadata
pub const DEFAULT_MAXAGE: Duration = Duration::from_secs(2 * 60);
/// Per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Consecutive failures before an uplink is considered offline
pub const DEFAULT_MAX_FAILS: u32 = 2;
/// How long an offline uplink is skipped before it is probed again
pub const DEFAULT_FAIL_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_STRICT_SSL: bool = true;
/// Environment variable consulted when no token source is configured
pub const DEFAULT_TOKEN_ENV: &str = "NPM_TOKEN";

/// One `[uplinks.<name>]` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UplinkSettings {
    /// Base URL of the upstream registry
    pub url: String,

    /// PEM encoded CA certificate to trust
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<IntervalValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxage: Option<IntervalValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_fails: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fail_timeout: Option<IntervalValue>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strict_ssl: Option<bool>,

    /// Headers added to (or overriding) every request to this uplink
    #[serde(default)]
    pub headers: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthSettings>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_proxy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub https_proxy: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub no_proxy: Option<NoProxy>,
}

/// `[uplinks.<name>.auth]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// `bearer` or `basic` (case-insensitive); basic when omitted
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub scheme: Option<String>,

    /// Inline token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Environment variable holding the token; `true` means `NPM_TOKEN`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<TokenEnv>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenEnv {
    Flag(bool),
    Name(String),
}

/// Hosts that bypass the proxy, as a list or a comma separated string
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NoProxy {
    List(Vec<String>),
    Joined(String),
}

impl NoProxy {
    /// Individual host suffixes, trimmed, empties dropped
    pub fn entries(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            NoProxy::List(items) => items.iter().map(String::as_str).collect(),
            NoProxy::Joined(joined) => joined.split(',').collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Authorization scheme sent to an uplink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Bearer,
    Basic,
}

impl AuthScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthScheme::Bearer => "Bearer",
            AuthScheme::Basic => "Basic",
        }
    }
}

impl fmt::Display for AuthScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuthScheme {
    type Err = BurrowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bearer" => Ok(AuthScheme::Bearer),
            "basic" => Ok(AuthScheme::Basic),
            other => Err(BurrowError::ConfigValidation {
                field: "auth.type".to_string(),
                reason: format!("Auth type '{}' not allowed", other),
            }),
        }
    }
}

/// Where the uplink token comes from, in priority order of configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenSource {
    Inline(String),
    Env(String),
    /// The conventional `NPM_TOKEN` variable
    DefaultEnv,
    /// `token_env = false` with no inline token: nothing can be resolved
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UplinkAuth {
    pub scheme: AuthScheme,
    pub source: TokenSource,
}

/// Validated, defaulted settings for one uplink
#[derive(Debug, Clone)]
pub struct UplinkConfig {
    /// Uplink name as used in config
    pub name: String,
    /// Parsed base URL
    pub url: Url,
    /// Base URL without trailing slash, used to build request URIs
    pub base_url: String,
    pub ca: Option<String>,
    pub auth: Option<UplinkAuth>,
    pub headers: BTreeMap<String, String>,
    pub maxage: Duration,
    pub timeout: Duration,
    pub max_fails: u32,
    pub fail_timeout: Duration,
    pub strict_ssl: bool,
    /// Proxy for this uplink's scheme, before no_proxy rules are applied
    pub proxy: Option<String>,
    pub no_proxy: Vec<String>,
    pub user_agent: String,
    pub server_id: String,
}

impl UplinkConfig {
    /// Host (and port, if any) of the uplink, used in logs and errors
    pub fn host(&self) -> String {
        match (self.url.host_str(), self.url.port()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            (None, _) => self.base_url.clone(),
        }
    }

    /// Host name without port, used for no_proxy matching
    pub fn hostname(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn is_https(&self) -> bool {
        self.url.scheme() == "https"
    }
}
