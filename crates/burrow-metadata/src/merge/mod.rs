//! Merging uplink package records into the local copy

use std::cmp::Ordering;

use burrow_core::types::{PackageRecord, Version, LATEST_TAG};
use tracing::trace;

/// Merge `upstream` into `local` in place.
///
/// Versions missing locally are copied over; existing local manifests are
/// never replaced. A dist-tag moves to the upstream value unless the local
/// value is strictly newer. Whenever `latest` ends up equal to upstream's,
/// upstream's readme replaces the local one.
pub fn merge_versions(local: &mut PackageRecord, upstream: &PackageRecord) {
    for (version, manifest) in &upstream.versions {
        if !local.versions.contains_key(version) {
            local.versions.insert(version.clone(), manifest.clone());
        }
    }

    for (tag, upstream_version) in &upstream.dist_tags {
        let current = local.dist_tags.get(tag);
        if current != Some(upstream_version) && accepts_upstream(current, upstream_version) {
            trace!(
                package = %local.name,
                tag = %tag,
                from = ?current,
                to = %upstream_version,
                "dist-tag updated from uplink"
            );
            local.dist_tags.insert(tag.clone(), upstream_version.clone());
        }

        if tag == LATEST_TAG && local.dist_tags.get(tag) == Some(upstream_version) {
            local.readme = upstream.readme.clone();
        }
    }
}

/// Whether a tag should move from `current` to `upstream`
fn accepts_upstream(current: Option<&String>, upstream: &str) -> bool {
    let Some(current) = current else {
        return true;
    };

    match (Version::parse_loose(current), Version::parse_loose(upstream)) {
        (Some(local), Some(remote)) => local.cmp(&remote) != Ordering::Greater,
        // Values that are not versions cannot be compared; keep what is cached
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burrow_core::types::VersionManifest;
    use serde_json::json;

    fn manifest(version: &str, description: &str) -> VersionManifest {
        let mut manifest = VersionManifest::new(version);
        manifest
            .attributes
            .insert("description".to_string(), json!(description));
        manifest
    }

    #[test]
    fn test_adds_missing_versions() {
        let mut local = PackageRecord::new("pkg").with_version("1.0.0");
        let upstream = PackageRecord::new("pkg").with_version("1.0.0").with_version("2.0.0");

        merge_versions(&mut local, &upstream);

        assert_eq!(local.versions.len(), 2);
        assert!(local.versions.contains_key("2.0.0"));
    }

    #[test]
    fn test_local_manifest_wins() {
        let mut local = PackageRecord::new("pkg");
        local.versions.insert("1.0.0".to_string(), manifest("1.0.0", "local"));
        let mut upstream = PackageRecord::new("pkg");
        upstream.versions.insert("1.0.0".to_string(), manifest("1.0.0", "upstream"));

        merge_versions(&mut local, &upstream);

        assert_eq!(local.versions["1.0.0"].attributes["description"], json!("local"));
    }

    #[test]
    fn test_tag_moves_forward() {
        let mut local = PackageRecord::new("pkg").with_tag("latest", "1.0.0");
        let upstream = PackageRecord::new("pkg").with_tag("latest", "1.1.0");

        merge_versions(&mut local, &upstream);

        assert_eq!(local.dist_tags["latest"], "1.1.0");
    }

    #[test]
    fn test_newer_local_tag_kept() {
        let mut local = PackageRecord::new("pkg")
            .with_tag("latest", "2.0.0")
            .with_tag("next", "3.0.0-beta.2");
        let upstream = PackageRecord::new("pkg")
            .with_tag("latest", "1.9.0")
            .with_tag("next", "3.0.0-beta.1");

        merge_versions(&mut local, &upstream);

        assert_eq!(local.dist_tags["latest"], "2.0.0");
        assert_eq!(local.dist_tags["next"], "3.0.0-beta.2");
    }

    #[test]
    fn test_missing_tag_copied() {
        let mut local = PackageRecord::new("pkg");
        let upstream = PackageRecord::new("pkg").with_tag("beta", "0.1.0-beta");

        merge_versions(&mut local, &upstream);

        assert_eq!(local.dist_tags["beta"], "0.1.0-beta");
    }

    #[test]
    fn test_build_metadata_is_equal_precedence() {
        let mut local = PackageRecord::new("pkg").with_tag("latest", "1.0.0+a");
        let upstream = PackageRecord::new("pkg").with_tag("latest", "1.0.0+b");

        merge_versions(&mut local, &upstream);

        assert_eq!(local.dist_tags["latest"], "1.0.0+b");
    }

    #[test]
    fn test_unparseable_tags_keep_local() {
        let mut local = PackageRecord::new("pkg").with_tag("legacy", "old-build");
        let upstream = PackageRecord::new("pkg").with_tag("legacy", "1.0.0");

        merge_versions(&mut local, &upstream);

        assert_eq!(local.dist_tags["legacy"], "old-build");
    }

    #[test]
    fn test_readme_follows_equal_latest() {
        let mut local = PackageRecord::new("pkg").with_tag("latest", "1.0.0");
        let mut upstream = PackageRecord::new("pkg").with_tag("latest", "1.0.0");
        upstream.readme = Some("R".to_string());

        merge_versions(&mut local, &upstream);

        assert_eq!(local.readme.as_deref(), Some("R"));
    }

    #[test]
    fn test_readme_follows_accepted_latest() {
        let mut local = PackageRecord::new("pkg").with_tag("latest", "1.0.0");
        local.readme = Some("old".to_string());
        let mut upstream = PackageRecord::new("pkg").with_tag("latest", "1.2.0");
        upstream.readme = Some("new".to_string());

        merge_versions(&mut local, &upstream);

        assert_eq!(local.readme.as_deref(), Some("new"));
    }

    #[test]
    fn test_readme_kept_when_local_latest_newer() {
        let mut local = PackageRecord::new("pkg").with_tag("latest", "2.0.0");
        local.readme = Some("local".to_string());
        let mut upstream = PackageRecord::new("pkg").with_tag("latest", "1.0.0");
        upstream.readme = Some("upstream".to_string());

        merge_versions(&mut local, &upstream);

        assert_eq!(local.readme.as_deref(), Some("local"));
    }

    #[test]
    fn test_readme_ignored_for_other_tags() {
        let mut local = PackageRecord::new("pkg");
        local.readme = Some("local".to_string());
        let mut upstream = PackageRecord::new("pkg").with_tag("next", "2.0.0");
        upstream.readme = Some("upstream".to_string());

        merge_versions(&mut local, &upstream);

        assert_eq!(local.readme.as_deref(), Some("local"));
    }
}

#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn version_string() -> impl Strategy<Value = String> {
        (0u64..5, 0u64..5, 0u64..5).prop_map(|(major, minor, patch)| format!("{}.{}.{}", major, minor, patch))
    }

    fn record() -> impl Strategy<Value = PackageRecord> {
        (
            prop::collection::vec(version_string(), 0..6),
            prop::collection::hash_map(prop::sample::select(vec!["latest", "next", "beta"]), version_string(), 0..3),
            prop::option::of("[a-z]{0,8}"),
        )
            .prop_map(|(versions, tags, readme)| {
                let mut record = PackageRecord::new("pkg");
                for version in versions {
                    record = record.with_version(&version);
                }
                for (tag, version) in tags {
                    record = record.with_tag(tag, &version);
                }
                record.readme = readme;
                record
            })
    }

    proptest! {
        #[test]
        fn merge_with_self_is_identity(local in record()) {
            let mut merged = local.clone();
            merge_versions(&mut merged, &local);
            prop_assert_eq!(merged, local);
        }

        #[test]
        fn local_versions_never_overwritten(local in record(), upstream in record()) {
            let mut merged = local.clone();
            merge_versions(&mut merged, &upstream);
            for (version, manifest) in &local.versions {
                prop_assert_eq!(&merged.versions[version], manifest);
            }
            for version in upstream.versions.keys() {
                prop_assert!(merged.versions.contains_key(version));
            }
        }

        #[test]
        fn tags_never_move_backwards(local in record(), upstream in record()) {
            let mut merged = local.clone();
            merge_versions(&mut merged, &upstream);
            for (tag, before) in &local.dist_tags {
                let before: Version = before.parse().unwrap();
                let after: Version = merged.dist_tags[tag].parse().unwrap();
                prop_assert!(after >= before);
            }
        }
    }
}
