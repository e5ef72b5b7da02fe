//! Authorization header construction for uplink requests

use burrow_config::uplink::{TokenSource, UplinkAuth, DEFAULT_TOKEN_ENV};
use burrow_core::error::BurrowError;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tracing::error;

use crate::RegistryResult;

/// Where environment variables are read from
pub trait EnvSource: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

/// The process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl<F> EnvSource for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn var(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Find the token for `auth`: inline, then the configured variable, then
/// `NPM_TOKEN`.
pub fn resolve_token(auth: &UplinkAuth, env: &dyn EnvSource) -> RegistryResult<String> {
    let token = match &auth.source {
        TokenSource::Inline(token) => Some(token.clone()),
        TokenSource::Env(name) => env.var(name),
        TokenSource::DefaultEnv => env.var(DEFAULT_TOKEN_ENV),
        TokenSource::Disabled => None,
    };

    token.ok_or_else(|| {
        let reason = match &auth.source {
            TokenSource::Env(name) => format!("token is required, but ${} is not set", name),
            TokenSource::Disabled => "token is required, but token_env is disabled".to_string(),
            _ => format!("token is required, but ${} is not set", DEFAULT_TOKEN_ENV),
        };
        error!(reason = %reason, "uplink auth misconfigured");
        BurrowError::AuthConfig { reason }
    })
}

/// Add an `Authorization` header for `auth` unless one is already set.
///
/// Without auth configured the headers are left alone.
pub fn apply_auth(headers: &mut HeaderMap, auth: Option<&UplinkAuth>, env: &dyn EnvSource) -> RegistryResult<()> {
    let Some(auth) = auth else {
        return Ok(());
    };
    if headers.contains_key(AUTHORIZATION) {
        return Ok(());
    }

    let token = resolve_token(auth, env)?;
    let mut value = HeaderValue::from_str(&format!("{} {}", auth.scheme.as_str(), token)).map_err(|_| {
        BurrowError::AuthConfig {
            reason: "token contains characters not allowed in a header".to_string(),
        }
    })?;
    value.set_sensitive(true);
    headers.insert(AUTHORIZATION, value);
    Ok(())
}
