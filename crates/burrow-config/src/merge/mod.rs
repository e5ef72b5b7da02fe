//! Layering of global settings under per-uplink settings

use std::time::Duration;

use burrow_core::error::BurrowError;
use tracing::warn;
use url::Url;

use crate::interval::IntervalValue;
use crate::toml::GlobalSettings;
use crate::uplink::{
    AuthScheme, AuthSettings, NoProxy, TokenEnv, TokenSource, UplinkAuth, UplinkConfig, UplinkSettings,
    DEFAULT_FAIL_TIMEOUT, DEFAULT_MAXAGE, DEFAULT_MAX_FAILS, DEFAULT_STRICT_SSL, DEFAULT_TIMEOUT,
};
use crate::ConfigResult;

/// Numeric timeouts at or above this were probably meant as milliseconds
const SUSPICIOUS_TIMEOUT_SECONDS: f64 = 1_000.0;

/// Default server id in `Via` headers
pub const DEFAULT_SERVER_ID: &str = "burrow";

/// Default `user_agent` when none is configured
pub fn default_user_agent() -> String {
    format!("burrow/{}", env!("CARGO_PKG_VERSION"))
}

/// Build the immutable configuration for one uplink.
///
/// Uplink values win over global ones. The proxy is selected by the
/// uplink URL's scheme; `no_proxy` falls back to the global list whenever
/// the uplink does not set its own.
pub fn resolve_uplink(
    name: &str,
    settings: &UplinkSettings,
    global: &GlobalSettings,
) -> ConfigResult<UplinkConfig> {
    let field = |key: &str| format!("uplinks.{}.{}", name, key);

    let url = Url::parse(&settings.url).map_err(|e| BurrowError::ConfigValidation {
        field: field("url"),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(BurrowError::ConfigValidation {
            field: field("url"),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    let base_url = settings.url.trim_end_matches('/').to_string();

    let timeout = interval_or(&settings.timeout, &field("timeout"), DEFAULT_TIMEOUT)?;
    if let Some(IntervalValue::Seconds(seconds)) = settings.timeout {
        if seconds >= SUSPICIOUS_TIMEOUT_SECONDS {
            warn!(
                uplink = name,
                timeout = seconds,
                "Too big timeout value: {}; timeout is now in seconds, use \"{}ms\" for milliseconds",
                seconds,
                seconds
            );
        }
    }

    let maxage = interval_or(&settings.maxage, &field("maxage"), DEFAULT_MAXAGE)?;
    let fail_timeout = interval_or(&settings.fail_timeout, &field("fail_timeout"), DEFAULT_FAIL_TIMEOUT)?;

    let auth = settings
        .auth
        .as_ref()
        .map(|auth| resolve_auth(auth, &field("auth")))
        .transpose()?;

    let (proxy, no_proxy) = resolve_proxy(&url, settings, global);

    Ok(UplinkConfig {
        name: name.to_string(),
        url,
        base_url,
        ca: settings.ca.clone(),
        auth,
        headers: settings.headers.clone(),
        maxage,
        timeout,
        max_fails: settings.max_fails.unwrap_or(DEFAULT_MAX_FAILS),
        fail_timeout,
        strict_ssl: settings.strict_ssl.unwrap_or(DEFAULT_STRICT_SSL),
        proxy,
        no_proxy,
        user_agent: global.user_agent.clone().unwrap_or_else(default_user_agent),
        server_id: global
            .server_id
            .clone()
            .unwrap_or_else(|| DEFAULT_SERVER_ID.to_string()),
    })
}

fn interval_or(value: &Option<IntervalValue>, field: &str, default: Duration) -> ConfigResult<Duration> {
    match value {
        Some(value) => value.to_duration(field),
        None => Ok(default),
    }
}

fn resolve_auth(auth: &AuthSettings, field: &str) -> ConfigResult<UplinkAuth> {
    let scheme = match &auth.scheme {
        Some(scheme) => scheme.parse::<AuthScheme>().map_err(|_| BurrowError::ConfigValidation {
            field: format!("{}.type", field),
            reason: format!("Auth type '{}' not allowed", scheme),
        })?,
        None => AuthScheme::Basic,
    };

    let source = match (&auth.token, &auth.token_env) {
        (Some(token), _) => TokenSource::Inline(token.clone()),
        (None, Some(TokenEnv::Name(name))) => TokenSource::Env(name.clone()),
        (None, Some(TokenEnv::Flag(true))) | (None, None) => TokenSource::DefaultEnv,
        (None, Some(TokenEnv::Flag(false))) => TokenSource::Disabled,
    };

    Ok(UplinkAuth { scheme, source })
}

/// Pick the proxy for the uplink's scheme and the no_proxy list that applies
fn resolve_proxy(url: &Url, settings: &UplinkSettings, global: &GlobalSettings) -> (Option<String>, Vec<String>) {
    let (uplink_proxy, global_proxy) = if url.scheme() == "https" {
        (&settings.https_proxy, &global.https_proxy)
    } else {
        (&settings.http_proxy, &global.http_proxy)
    };

    // The bypass list falls back on its own, independently of the proxy
    let no_proxy = settings
        .no_proxy
        .as_ref()
        .or(global.no_proxy.as_ref())
        .map(NoProxy::entries)
        .unwrap_or_default();

    (uplink_proxy.clone().or_else(|| global_proxy.clone()), no_proxy)
}
