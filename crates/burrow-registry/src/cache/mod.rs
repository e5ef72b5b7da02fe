//! Uplink freshness marks
//!
//! A cached `PackageRecord` remembers, per uplink, when it was last
//! refreshed and with which etag. Records fetched less than `maxage` ago
//! are fresh and need not be requested again; stale ones are re-requested
//! conditionally with the remembered etag.

use std::time::Duration;

use burrow_core::types::{PackageRecord, UplinkMark};
use chrono::{DateTime, Utc};

/// Freshness policy of one uplink
#[derive(Debug, Clone)]
pub struct UplinkFreshness {
    uplink: String,
    maxage: Duration,
}

impl UplinkFreshness {
    pub fn new(uplink: impl Into<String>, maxage: Duration) -> Self {
        Self {
            uplink: uplink.into(),
            maxage,
        }
    }

    pub fn maxage(&self) -> Duration {
        self.maxage
    }

    /// Whether `record` was refreshed from this uplink within `maxage`
    pub fn is_fresh(&self, record: &PackageRecord) -> bool {
        self.is_fresh_at(record, Utc::now())
    }

    pub fn is_fresh_at(&self, record: &PackageRecord, now: DateTime<Utc>) -> bool {
        let Some(mark) = record.uplinks.get(&self.uplink) else {
            return false;
        };
        let Some(fetched) = DateTime::<Utc>::from_timestamp_millis(mark.fetched) else {
            return false;
        };
        match (now - fetched).to_std() {
            Ok(age) => age < self.maxage,
            // Fetched in the future: the clock went backwards, consider stale
            Err(_) => false,
        }
    }

    /// Etag remembered from the last fetch
    pub fn cached_etag<'a>(&self, record: &'a PackageRecord) -> Option<&'a str> {
        record
            .uplinks
            .get(&self.uplink)
            .and_then(|mark| mark.etag.as_deref())
    }

    /// Remember a successful fetch
    pub fn mark_fetched(&self, record: &mut PackageRecord, etag: Option<String>) {
        self.mark_fetched_at(record, etag, Utc::now());
    }

    pub fn mark_fetched_at(&self, record: &mut PackageRecord, etag: Option<String>, now: DateTime<Utc>) {
        record.uplinks.insert(
            self.uplink.clone(),
            UplinkMark {
                etag,
                fetched: now.timestamp_millis(),
            },
        );
    }
}
