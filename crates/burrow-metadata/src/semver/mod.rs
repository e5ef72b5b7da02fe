//! Version list ordering and latest-version resolution

use burrow_core::error::BurrowError;
use burrow_core::types::{PackageRecord, Version};

use crate::MetadataResult;

/// Drop strings that are not versions and sort the rest ascending.
///
/// Comparison is loose (`v1.2.3` and `=1.2.3` are accepted). Versions that
/// compare equal, such as `1.0.0` and `1.0.0+build`, are ordered by their
/// original spelling so the output does not depend on input order.
pub fn sort_versions<I, S>(versions: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut parsed: Vec<(Version, String)> = versions
        .into_iter()
        .filter_map(|raw| {
            let raw = raw.as_ref();
            Version::parse_loose(raw).map(|version| (version, raw.to_string()))
        })
        .collect();

    parsed.sort_by(|(a, a_raw), (b, b_raw)| a.cmp(b).then_with(|| a_raw.cmp(b_raw)));
    parsed.into_iter().map(|(_, raw)| raw).collect()
}

/// The version a client gets when it asks for no particular version.
///
/// Returns the `latest` dist-tag verbatim when present, without checking
/// that it names a known version. Otherwise falls back to the head of the
/// ascending version list, which is the lowest version.
pub fn resolve_latest(record: &PackageRecord) -> MetadataResult<String> {
    if record.versions.is_empty() {
        return Err(BurrowError::EmptyPackage {
            name: record.name.clone(),
        });
    }

    if let Some(latest) = record.latest_tag() {
        return Ok(latest.to_string());
    }

    // TODO: confirm whether the untagged fallback should be the highest version
    sort_versions(record.versions.keys())
        .into_iter()
        .next()
        .ok_or_else(|| BurrowError::EmptyPackage {
            name: record.name.clone(),
        })
}


#[cfg(test)]
mod property_tests {
    use super::*;
    use proptest::prelude::*;

    fn version_string() -> impl Strategy<Value = String> {
        (0u64..20, 0u64..20, 0u64..20).prop_map(|(major, minor, patch)| format!("{}.{}.{}", major, minor, patch))
    }

    proptest! {
        #[test]
        fn sorted_output_is_ascending(versions in prop::collection::vec(version_string(), 0..30)) {
            let sorted = sort_versions(&versions);
            prop_assert_eq!(sorted.len(), versions.len());
            for pair in sorted.windows(2) {
                let a: Version = pair[0].parse().unwrap();
                let b: Version = pair[1].parse().unwrap();
                prop_assert!(a <= b);
            }
        }

        #[test]
        fn invalid_entries_are_dropped(versions in prop::collection::vec(version_string(), 0..10)) {
            let mut mixed = versions.clone();
            mixed.push("latest".to_string());
            mixed.push("".to_string());
            prop_assert_eq!(sort_versions(&mixed).len(), versions.len());
        }
    }
}
