//! Outbound proxy selection

use burrow_config::UplinkConfig;
use tracing::debug;

/// Whether `hostname` is excluded from proxying by `no_proxy`.
///
/// Both sides are compared with a leading dot, by suffix, ignoring case:
/// `example.com` covers `example.com` and `api.example.com` but not
/// `notexample.com`.
pub fn should_bypass_proxy<S: AsRef<str>>(hostname: &str, no_proxy: &[S]) -> bool {
    let host = dotted(hostname);
    no_proxy
        .iter()
        .map(|entry| entry.as_ref().trim())
        .filter(|entry| !entry.is_empty())
        .any(|entry| host.ends_with(&dotted(entry)))
}

fn dotted(value: &str) -> String {
    let value = value.to_ascii_lowercase();
    if value.starts_with('.') {
        value
    } else {
        format!(".{}", value)
    }
}

/// The proxy uplink traffic should go through, if any
pub fn effective_proxy(config: &UplinkConfig) -> Option<String> {
    let proxy = config.proxy.as_ref()?;
    if should_bypass_proxy(config.hostname(), &config.no_proxy) {
        debug!(uplink = %config.name, host = config.hostname(), "not using proxy, host is in no_proxy list");
        return None;
    }
    debug!(uplink = %config.name, proxy = %proxy, "using proxy for uplink");
    Some(proxy.clone())
}
