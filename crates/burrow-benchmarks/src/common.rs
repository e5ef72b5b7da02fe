//! Common utilities for benchmarks

use burrow_core::types::{PackageRecord, VersionManifest};
use criterion::Criterion;
use pprof::criterion::{Output, PProfProfiler};

/// Configure criterion with flamegraph profiling support
pub fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(std::time::Duration::from_secs(3))
        .measurement_time(std::time::Duration::from_secs(10))
        .sample_size(100)
        .with_profiler(PProfProfiler::new(100, Output::Flamegraph(None)))
}

/// Version strings in a shuffled, registry-like mix of releases and
/// prereleases
pub fn version_strings(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            // Stride through the space so the input is not already sorted
            let n = (i * 7919) % count.max(1);
            let major = n / 100;
            let minor = (n / 10) % 10;
            let patch = n % 10;
            if n % 13 == 0 {
                format!("{}.{}.{}-beta.{}", major, minor, patch, n % 5)
            } else {
                format!("{}.{}.{}", major, minor, patch)
            }
        })
        .collect()
}

/// A package document with `count` versions and a `latest` tag
pub fn package_record(name: &str, count: usize) -> PackageRecord {
    let mut record = PackageRecord::new(name);
    for version in version_strings(count) {
        record.versions.insert(version.clone(), VersionManifest::new(version));
    }
    let latest = format!("{}.{}.{}", count / 100, (count / 10) % 10, count % 10);
    record.versions.insert(latest.clone(), VersionManifest::new(latest.clone()));
    record.dist_tags.insert("latest".to_string(), latest);
    record
}

/// A registry config with `count` uplinks
pub fn registry_toml(count: usize) -> String {
    let mut content = String::from("user_agent = \"burrow-bench\"\nhttp_proxy = \"http://proxy.corp:3128\"\n");
    for i in 0..count {
        content.push_str(&format!(
            "\n[uplinks.mirror{i}]\nurl = \"https://registry{i}.example.com/\"\ntimeout = \"1m 30s\"\nmaxage = \"10m\"\nmax_fails = 3\nno_proxy = \"example.com, internal\"\n\n[uplinks.mirror{i}.auth]\ntype = \"bearer\"\ntoken_env = \"MIRROR_{i}_TOKEN\"\n",
            i = i
        ));
    }
    content
}
