//! Request options and response types for uplink calls

use burrow_core::types::PackageRecord;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

/// The downstream client a request is made on behalf of
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
    /// Peer address of the downstream connection
    pub remote_address: String,
    /// Incoming `X-Forwarded-For` value, if any
    pub forwarded_for: Option<String>,
}

/// Options for `get_remote_metadata`
#[derive(Debug, Clone, Default)]
pub struct MetadataOptions {
    /// Etag from the last fetch; sent as `If-None-Match`
    pub etag: Option<String>,
    /// Headers the caller already set (`Authorization`, `Via`, ...)
    pub headers: HeaderMap,
    pub client: Option<ClientInfo>,
    /// Cancels the request; the call then fails with `Aborted`
    pub cancel: Option<CancellationToken>,
}

/// Options for `fetch_tarball`
#[derive(Debug, Clone, Default)]
pub struct TarballOptions {
    pub headers: HeaderMap,
    pub client: Option<ClientInfo>,
    /// Aborting the returned stream cancels this token as well
    pub cancel: Option<CancellationToken>,
}

/// Metadata returned by an uplink
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteMetadata {
    pub record: PackageRecord,
    /// Etag of the response, for the next conditional fetch
    pub etag: Option<String>,
}

/// Query for the `/-/v1/search` endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popularity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maintenance: Option<f64>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            size: None,
            from: None,
            quality: None,
            popularity: None,
            maintenance: None,
        }
    }

    /// Page through results `size` at a time starting at `from`
    pub fn page(mut self, from: u32, size: u32) -> Self {
        self.from = Some(from);
        self.size = Some(size);
        self
    }
}

/// One element of a search response's `objects` array
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchObject {
    pub package: SearchPackage,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Value>,

    #[serde(default, rename = "searchScore", skip_serializing_if = "Option::is_none")]
    pub search_score: Option<f64>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Package summary inside a search result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPackage {
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}
