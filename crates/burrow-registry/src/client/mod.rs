//! HTTP client for one uplink
//!
//! Each `UplinkClient` owns its connection pool, its proxy decision and its
//! circuit breaker. Any HTTP answer counts as the uplink being reachable;
//! transport errors and timeouts count as failures. Cancelled requests and
//! requests refused before reaching the network leave the breaker alone.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use burrow_config::UplinkConfig;
use burrow_core::error::BurrowError;
use burrow_core::stream::{Opened, TarballStream};
use burrow_core::types::PackageRecord;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ETAG, IF_NONE_MATCH, USER_AGENT, VIA};
use reqwest::{Certificate, Client, ClientBuilder, Proxy, RequestBuilder, Response, StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::api::{ClientInfo, MetadataOptions, RemoteMetadata, SearchQuery, TarballOptions};
use crate::auth::{apply_auth, EnvSource, ProcessEnv};
use crate::cache::UplinkFreshness;
use crate::circuit::CircuitBreaker;
use crate::proxy::effective_proxy;
use crate::search::{decode_objects, SearchStream};
use crate::RegistryResult;

const ACCEPT_JSON: &str = "application/json";
const ACCEPT_TARBALL: &str = "application/octet-stream";
const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Client for one configured upstream registry
pub struct UplinkClient {
    /// Underlying HTTP client with connection pooling
    client: Client,
    config: UplinkConfig,
    /// Base registry URL without trailing slash
    base_url: String,
    circuit: Arc<CircuitBreaker>,
    freshness: UplinkFreshness,
    /// Proxy in use after no_proxy rules, if any
    proxy: Option<String>,
    user_agent: HeaderValue,
    via: String,
    /// Configured headers, applied last
    overrides: HeaderMap,
    env: Arc<dyn EnvSource>,
}

impl UplinkClient {
    /// Create a client reading auth tokens from the process environment
    pub fn new(config: UplinkConfig) -> RegistryResult<Self> {
        Self::with_env(config, Arc::new(ProcessEnv))
    }

    /// Create a client with a custom environment for token lookup
    pub fn with_env(config: UplinkConfig, env: Arc<dyn EnvSource>) -> RegistryResult<Self> {
        let proxy = effective_proxy(&config);
        let client = build_http_client(&config, proxy.as_deref())?;

        let user_agent = HeaderValue::from_str(&format!("npm ({})", config.user_agent)).map_err(|_| {
            BurrowError::ConfigValidation {
                field: "user_agent".to_string(),
                reason: "not a valid header value".to_string(),
            }
        })?;
        let via = format!("1.1 {} (Burrow)", config.server_id);
        HeaderValue::from_str(&via).map_err(|_| BurrowError::ConfigValidation {
            field: "server_id".to_string(),
            reason: "not a valid header value".to_string(),
        })?;
        let overrides = parse_overrides(&config)?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            circuit: Arc::new(CircuitBreaker::new(config.host(), config.max_fails, config.fail_timeout)),
            freshness: UplinkFreshness::new(config.name.clone(), config.maxage),
            proxy,
            user_agent,
            via,
            overrides,
            env,
            config,
        })
    }

    pub fn config(&self) -> &UplinkConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Proxy used for this uplink, if any
    pub fn proxy(&self) -> Option<&str> {
        self.proxy.as_deref()
    }

    pub fn circuit(&self) -> &CircuitBreaker {
        &self.circuit
    }

    /// Whether requests to this uplink are currently admitted
    pub fn is_available(&self) -> bool {
        self.circuit.is_available()
    }

    /// Feed a request outcome into the circuit breaker
    pub fn record_outcome(&self, success: bool) {
        self.circuit.record_outcome(success);
    }

    /// Whether `record` was refreshed from this uplink within `maxage`
    pub fn is_fresh(&self, record: &PackageRecord) -> bool {
        self.freshness.is_fresh(record)
    }

    /// Etag remembered for this uplink on `record`
    pub fn cached_etag<'a>(&self, record: &'a PackageRecord) -> Option<&'a str> {
        self.freshness.cached_etag(record)
    }

    /// Stamp `record` as refreshed from this uplink now
    pub fn mark_fetched(&self, record: &mut PackageRecord, etag: Option<String>) {
        self.freshness.mark_fetched(record, etag);
    }

    /// Fetch a package document.
    ///
    /// With an etag the request is conditional; an unchanged document comes
    /// back as `BadStatus { status: 304 }`.
    pub async fn get_remote_metadata(&self, name: &str, options: MetadataOptions) -> RegistryResult<RemoteMetadata> {
        self.check_available()?;

        let mut headers = options.headers;
        if let Some(etag) = &options.etag {
            let value = HeaderValue::from_str(etag).map_err(|_| BurrowError::Internal {
                message: format!("etag '{}' is not a valid header value", etag),
                source: None,
            })?;
            headers.insert(IF_NONE_MATCH, value);
        }
        let headers = self.request_headers(ACCEPT_JSON, headers, options.client.as_ref())?;

        let url = format!("{}/{}", self.base_url, encode_package_name(name));
        let token = options.cancel.unwrap_or_default();
        info!(uplink = %self.config.name, url = %url, "making request: 'GET {}'", url);

        let request = self.client.get(&url).headers(headers).timeout(self.config.timeout);
        let response = self.send(request, &url, &token).await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(BurrowError::NotFound {
                resource: name.to_string(),
            });
        }
        if !status.is_success() {
            return Err(BurrowError::BadStatus {
                status: status.as_u16(),
                url,
            });
        }

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);

        let body = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            body = response.bytes() => Some(body),
        };
        let body = body
            .ok_or_else(|| BurrowError::aborted(format!("request to {} was aborted", url)))?
            .map_err(|e| transport_error(&url, e))?;

        let record: PackageRecord = serde_json::from_slice(&body)
            .map_err(|e| BurrowError::internal(format!("failed to parse metadata for '{}'", name), e))?;

        info!(
            uplink = %self.config.name,
            status = status.as_u16(),
            bytes = body.len(),
            "fetched metadata for {}",
            name
        );
        Ok(RemoteMetadata { record, etag })
    }

    /// Stream a tarball from `url`.
    ///
    /// The request is only sent once the stream is first polled (or
    /// `open`ed). `timeout` bounds the wait for response headers; the body
    /// streams for as long as the consumer keeps reading.
    pub fn fetch_tarball(&self, url: &str, options: TarballOptions) -> TarballStream {
        if let Err(err) = self.check_available() {
            return TarballStream::failed(err);
        }
        let headers = match self.request_headers(ACCEPT_TARBALL, options.headers, options.client.as_ref()) {
            Ok(headers) => headers,
            Err(err) => return TarballStream::failed(err),
        };

        let token = options.cancel.unwrap_or_default();
        let request = self.client.get(url).headers(headers);
        let circuit = Arc::clone(&self.circuit);
        let timeout = self.config.timeout;
        let uplink = self.config.name.clone();
        let url = url.to_string();
        info!(uplink = %uplink, url = %url, "making request: 'GET {}'", url);

        let open = async move {
            let response = match tokio::time::timeout(timeout, request.send()).await {
                Ok(Ok(response)) => {
                    circuit.record_outcome(true);
                    response
                },
                Ok(Err(e)) => {
                    circuit.record_outcome(false);
                    return Err(transport_error(&url, e));
                },
                Err(_) => {
                    circuit.record_outcome(false);
                    return Err(timeout_error(&url, timeout));
                },
            };

            let status = response.status();
            info!(uplink = %uplink, status = status.as_u16(), url = %url, "uplink responded (streaming)");
            if status == StatusCode::NOT_FOUND {
                return Err(BurrowError::NotFound { resource: url });
            }
            if !status.is_success() {
                return Err(BurrowError::BadStatus {
                    status: status.as_u16(),
                    url,
                });
            }

            let content_length = response.content_length();
            let body = response.bytes_stream().map(|chunk| {
                chunk.map_err(|e| BurrowError::network(format!("failed to read tarball body: {}", e), e))
            });
            Ok(Opened {
                content_length,
                body: Box::pin(body),
            })
        };

        TarballStream::opening(open, token)
    }

    /// Search the uplink, decoding results as the response arrives.
    ///
    /// Search traffic does not consult or update the circuit breaker.
    pub async fn search(&self, query: &SearchQuery, cancel: Option<CancellationToken>) -> RegistryResult<SearchStream> {
        let headers = self.request_headers(ACCEPT_JSON, HeaderMap::new(), None)?;
        let url = format!("{}/-/v1/search", self.base_url);
        let token = cancel.unwrap_or_default();
        info!(uplink = %self.config.name, url = %url, text = %query.text, "search request to uplink");

        let request = self
            .client
            .get(&url)
            .query(query)
            .headers(headers)
            .timeout(self.config.timeout);

        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            sent = request.send() => Some(sent),
        };
        let response = sent
            .ok_or_else(|| BurrowError::aborted("search was aborted"))?
            .map_err(|e| transport_error(&url, e))?;

        let status = response.status();
        debug!(uplink = %self.config.name, status = status.as_u16(), "search response");
        if status.as_u16() >= 400 {
            return Err(BurrowError::BadStatus {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| BurrowError::network(format!("failed to read search body: {}", e), e))
        });
        Ok(decode_objects(Box::pin(body), token))
    }

    fn check_available(&self) -> RegistryResult<()> {
        if self.circuit.is_available() {
            Ok(())
        } else {
            debug!(uplink = %self.config.name, "uplink is offline, skipping request");
            Err(BurrowError::Offline {
                host: self.circuit.host().to_string(),
            })
        }
    }

    /// Send a request, racing it against cancellation, and record the
    /// outcome in the circuit breaker
    async fn send(&self, request: RequestBuilder, url: &str, token: &CancellationToken) -> RegistryResult<Response> {
        let sent = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            sent = request.send() => Some(sent),
        };

        match sent {
            None => {
                debug!(url = %url, "request aborted");
                Err(BurrowError::aborted(format!("request to {} was aborted", url)))
            },
            Some(Ok(response)) => {
                self.circuit.record_outcome(true);
                info!(
                    uplink = %self.config.name,
                    status = response.status().as_u16(),
                    url = %url,
                    "uplink responded"
                );
                Ok(response)
            },
            Some(Err(e)) => {
                self.circuit.record_outcome(false);
                Err(transport_error(url, e))
            },
        }
    }

    /// Complete the caller's headers for an uplink request.
    ///
    /// Caller values for `Accept`, `User-Agent` and `Authorization` are
    /// kept. `Via` is appended to. Configured headers override everything.
    pub(crate) fn request_headers(
        &self,
        accept: &'static str,
        mut headers: HeaderMap,
        client: Option<&ClientInfo>,
    ) -> RegistryResult<HeaderMap> {
        if !headers.contains_key(ACCEPT) {
            headers.insert(ACCEPT, HeaderValue::from_static(accept));
        }
        if !headers.contains_key(USER_AGENT) {
            headers.insert(USER_AGENT, self.user_agent.clone());
        }

        let via = match headers.get(VIA).and_then(|value| value.to_str().ok()) {
            Some(incoming) => format!("{}, {}", incoming, self.via),
            None => self.via.clone(),
        };
        headers.insert(VIA, header_value(&via)?);

        // A forwarding proxy could reject requests carrying this header
        if self.proxy.is_none() {
            if let Some(client) = client {
                let forwarded = match &client.forwarded_for {
                    Some(previous) => format!("{}, {}", previous, client.remote_address),
                    None => client.remote_address.clone(),
                };
                headers.insert(X_FORWARDED_FOR, header_value(&forwarded)?);
            }
        }

        apply_auth(&mut headers, self.config.auth.as_ref(), self.env.as_ref())?;

        for (name, value) in &self.overrides {
            headers.insert(name.clone(), value.clone());
        }
        Ok(headers)
    }
}

impl fmt::Debug for UplinkClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UplinkClient")
            .field("name", &self.config.name)
            .field("base_url", &self.base_url)
            .field("proxy", &self.proxy)
            .field("circuit", &self.circuit)
            .finish_non_exhaustive()
    }
}

fn build_http_client(config: &UplinkConfig, proxy: Option<&str>) -> RegistryResult<Client> {
    let mut builder = ClientBuilder::new()
        // Connection pooling configuration
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .gzip(true)
        .danger_accept_invalid_certs(!config.strict_ssl);

    if let Some(ca) = &config.ca {
        let certificate = Certificate::from_pem(ca.as_bytes()).map_err(|e| BurrowError::ConfigValidation {
            field: format!("uplinks.{}.ca", config.name),
            reason: e.to_string(),
        })?;
        builder = builder.add_root_certificate(certificate);
    }

    builder = match proxy {
        Some(proxy) => builder.proxy(Proxy::all(proxy).map_err(|e| BurrowError::ConfigValidation {
            field: format!("uplinks.{}.proxy", config.name),
            reason: e.to_string(),
        })?),
        // Environment proxies are not consulted
        None => builder.no_proxy(),
    };

    builder
        .build()
        .map_err(|e| BurrowError::network(format!("Failed to create HTTP client: {}", e), e))
}

fn parse_overrides(config: &UplinkConfig) -> RegistryResult<HeaderMap> {
    let mut overrides = HeaderMap::new();
    for (name, value) in &config.headers {
        let invalid = || BurrowError::ConfigValidation {
            field: format!("uplinks.{}.headers.{}", config.name, name),
            reason: "not a valid header".to_string(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        overrides.insert(header_name, header_value);
    }
    Ok(overrides)
}

fn header_value(value: &str) -> RegistryResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| BurrowError::Internal {
        message: format!("'{}' is not a valid header value", value),
        source: None,
    })
}

fn transport_error(url: &str, error: reqwest::Error) -> BurrowError {
    if error.is_timeout() {
        BurrowError::network(format!("request to {} timed out", url), error)
    } else {
        BurrowError::network(format!("request to {} failed: {}", url, error), error)
    }
}

fn timeout_error(url: &str, timeout: Duration) -> BurrowError {
    BurrowError::Network {
        message: format!("request to {} timed out after {:?}", url, timeout),
        source: None,
    }
}

/// Percent-encode a package name for a URL path.
///
/// Everything but unreserved characters is escaped, except that the `@` of
/// a scope stays readable: `@scope/pkg` becomes `@scope%2Fpkg`.
pub fn encode_package_name(name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for byte in name.bytes() {
        match byte {
            b'A'..=b'Z'
            | b'a'..=b'z'
            | b'0'..=b'9'
            | b'-'
            | b'_'
            | b'.'
            | b'!'
            | b'~'
            | b'*'
            | b'\''
            | b'('
            | b')' => encoded.push(byte as char),
            _ => encoded.push_str(&format!("%{:02X}", byte)),
        }
    }

    match encoded.strip_prefix("%40") {
        Some(rest) => format!("@{}", rest),
        None => encoded,
    }
}
