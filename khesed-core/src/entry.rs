//! Cache entry and per-write options.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EpochMillis;

/// Default entry version when the caller does not supply one.
pub const DEFAULT_VERSION: u32 = 1;

/// One cached computation result.
///
/// The serialized form is the mirror record format:
/// `{"data": .., "createdAt": <epoch ms>, "ttlMillis": .., "tags": [..], "version": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry<T> {
    pub data: T,
    pub created_at: EpochMillis,
    pub ttl_millis: u64,
    pub tags: BTreeSet<String>,
    /// Caller-side version; carried, never checked by the cache.
    pub version: u32,
}

impl<T> CacheEntry<T> {
    pub fn new(
        data: T,
        created_at: EpochMillis,
        ttl: Duration,
        tags: BTreeSet<String>,
        version: u32,
    ) -> Self {
        Self {
            data,
            created_at,
            ttl_millis: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
            tags,
            version,
        }
    }

    /// Milliseconds elapsed since creation. Negative ages (clock moved
    /// backwards) count as zero.
    pub fn age_millis(&self, now: EpochMillis) -> u64 {
        u64::try_from(now.saturating_sub(self.created_at)).unwrap_or(0)
    }

    /// An entry is valid iff `now - created_at < ttl_millis`.
    pub fn is_valid_at(&self, now: EpochMillis) -> bool {
        self.age_millis(now) < self.ttl_millis
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_millis)
    }

    /// Creation time as a UTC timestamp, if representable.
    pub fn created_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.created_at)
    }
}

/// Options for a single `set`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    /// `None` uses the cache's configured default TTL.
    pub ttl: Option<Duration>,
    pub tags: BTreeSet<String>,
    pub version: u32,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            ttl: None,
            tags: BTreeSet::new(),
            version: DEFAULT_VERSION,
        }
    }
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_ttl_secs(self, secs: u64) -> Self {
        self.with_ttl(Duration::from_secs(secs))
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_version(mut self, version: u32) -> Self {
        self.version = version;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: EpochMillis = 1_704_067_200_000;

    fn entry(ttl_secs: u64) -> CacheEntry<i32> {
        CacheEntry::new(
            7,
            T0,
            Duration::from_secs(ttl_secs),
            BTreeSet::new(),
            DEFAULT_VERSION,
        )
    }

    #[test]
    fn test_validity_boundary() {
        let e = entry(60);
        assert!(e.is_valid_at(T0));
        assert!(e.is_valid_at(T0 + 59_999));
        // Stale exactly at the TTL boundary
        assert!(!e.is_valid_at(T0 + 60_000));
        assert!(!e.is_valid_at(T0 + 61_000));
    }

    #[test]
    fn test_clock_skew_counts_as_fresh() {
        let e = entry(1);
        assert_eq!(e.age_millis(T0 - 5_000), 0);
        assert!(e.is_valid_at(T0 - 5_000));
    }

    #[test]
    fn test_record_format_is_camel_case() {
        let e = CacheEntry::new(
            vec!["a".to_string()],
            T0,
            Duration::from_secs(60),
            ["search".to_string(), "church_c1".to_string()].into_iter().collect(),
            3,
        );
        let json: serde_json::Value = serde_json::to_value(&e).expect("serialize");
        assert_eq!(json["createdAt"], T0);
        assert_eq!(json["ttlMillis"], 60_000);
        assert_eq!(json["version"], 3);
        assert_eq!(json["tags"], serde_json::json!(["church_c1", "search"]));
        assert_eq!(json["data"], serde_json::json!(["a"]));
    }

    #[test]
    fn test_created_at_utc() {
        let e = entry(1);
        let utc = e.created_at_utc().expect("representable");
        assert_eq!(utc.timestamp_millis(), T0);
    }

    #[test]
    fn test_options_builder() {
        let opts = CacheOptions::new()
            .with_ttl_secs(60)
            .with_tags(["search", "church_c1"])
            .with_tag("search")
            .with_version(2);

        assert_eq!(opts.ttl, Some(Duration::from_secs(60)));
        assert_eq!(opts.tags.len(), 2);
        assert!(opts.tags.contains("church_c1"));
        assert_eq!(opts.version, 2);
    }

    #[test]
    fn test_options_default() {
        let opts = CacheOptions::default();
        assert!(opts.ttl.is_none());
        assert!(opts.tags.is_empty());
        assert_eq!(opts.version, DEFAULT_VERSION);
    }
}
