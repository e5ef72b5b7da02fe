//! Package record types.
//!
//! A `PackageRecord` is the registry document for one package: every
//! published version's manifest, the dist-tags pointing into them, the
//! readme and the attached tarballs. Fields the proxy does not interpret
//! are carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// The dist-tag every registry client resolves by default
pub const LATEST_TAG: &str = "latest";

/// Package document as stored locally and served by uplinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,

    /// Manifests keyed by version string
    #[serde(default)]
    pub versions: HashMap<String, VersionManifest>,

    /// Tag name to version string
    #[serde(default, rename = "dist-tags")]
    pub dist_tags: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readme: Option<String>,

    /// Blob filename to blob metadata
    #[serde(default, rename = "_attachments")]
    pub attachments: HashMap<String, Attachment>,

    /// Per-uplink fetch marks, keyed by uplink name
    #[serde(default, rename = "_uplinks", skip_serializing_if = "HashMap::is_empty")]
    pub uplinks: HashMap<String, UplinkMark>,

    /// Everything else in the document (`time`, `maintainers`, ...)
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// Manifest of one published version; only the version key is interpreted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionManifest {
    pub version: String,

    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

/// Metadata about an attached tarball
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Attachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shasum: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// When a record was last refreshed from an uplink and with which etag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UplinkMark {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Milliseconds since the Unix epoch
    pub fetched: i64,
}

impl PackageRecord {
    /// Create an empty record for a package
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            versions: HashMap::new(),
            dist_tags: HashMap::new(),
            readme: None,
            attachments: HashMap::new(),
            uplinks: HashMap::new(),
            other: Map::new(),
        }
    }

    /// Insert a bare manifest for `version`
    pub fn with_version(mut self, version: &str) -> Self {
        self.versions
            .insert(version.to_string(), VersionManifest::new(version));
        self
    }

    /// Point `tag` at `version`
    pub fn with_tag(mut self, tag: &str, version: &str) -> Self {
        self.dist_tags.insert(tag.to_string(), version.to_string());
        self
    }

    /// The version the `latest` tag points to, if set
    pub fn latest_tag(&self) -> Option<&str> {
        self.dist_tags.get(LATEST_TAG).map(String::as_str)
    }

    /// Dist-tags whose target is not a known version
    pub fn dangling_tags(&self) -> Vec<(&str, &str)> {
        let mut dangling: Vec<(&str, &str)> = self
            .dist_tags
            .iter()
            .filter(|(_, version)| !self.versions.contains_key(version.as_str()))
            .map(|(tag, version)| (tag.as_str(), version.as_str()))
            .collect();
        dangling.sort_unstable();
        dangling
    }
}

impl VersionManifest {
    /// Create a manifest carrying only its version
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            attributes: Map::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_round_trips_unknown_fields() {
        let raw = serde_json::json!({
            "name": "left-pad",
            "versions": {
                "1.0.0": {
                    "version": "1.0.0",
                    "dist": { "tarball": "https://registry.npmjs.org/left-pad/-/left-pad-1.0.0.tgz" }
                }
            },
            "dist-tags": { "latest": "1.0.0" },
            "time": { "1.0.0": "2016-03-23T00:00:00.000Z" },
            "_attachments": {}
        });

        let record: PackageRecord = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(record.name, "left-pad");
        assert_eq!(record.latest_tag(), Some("1.0.0"));
        assert!(record.other.contains_key("time"));
        assert!(record.versions["1.0.0"].attributes.contains_key("dist"));

        let back = serde_json::to_value(&record).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_missing_collections_default_to_empty() {
        let record: PackageRecord = serde_json::from_str(r#"{"name":"bare"}"#).unwrap();
        assert!(record.versions.is_empty());
        assert!(record.dist_tags.is_empty());
        assert!(record.readme.is_none());
        assert!(record.latest_tag().is_none());
    }

    #[test]
    fn test_uplink_marks_serialized_under_underscore_key() {
        let mut record = PackageRecord::new("marked");
        record.uplinks.insert(
            "npmjs".to_string(),
            UplinkMark {
                etag: Some("W/\"abc\"".to_string()),
                fetched: 1_700_000_000_000,
            },
        );

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["_uplinks"]["npmjs"]["fetched"], 1_700_000_000_000i64);
    }

    #[test]
    fn test_dangling_tags() {
        let record = PackageRecord::new("tags")
            .with_version("1.0.0")
            .with_tag("latest", "1.0.0")
            .with_tag("next", "2.0.0-rc.1");

        assert_eq!(record.dangling_tags(), vec![("next", "2.0.0-rc.1")]);
    }
}
