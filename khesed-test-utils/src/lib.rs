//! Khesed Test Utilities
//!
//! Shared test infrastructure for the Khesed workspace:
//! - Failure-injecting mirror stores
//! - Counting fetchers for fallback assertions
//! - Proptest generators for keys, tags and options
//! - Test fixtures for common scenarios
//! - Custom assertions for cache results

pub use khesed_cache::{CacheStats, InMemoryStore, SecondaryStore, TieredCache};
pub use khesed_core::{
    CacheConfig, CacheEntry, CacheError, CacheOptions, Clock, ConfigError, KhesedError,
    KhesedResult, ManualClock, MirrorError,
};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use khesed_cache::MirrorResult;

// ============================================================================
// MOCK STORES AND FETCHERS
// ============================================================================

/// Mirror store that can be told to fail individual operations.
///
/// Wraps an [`InMemoryStore`]; while a failure flag is set the matching
/// operation returns [`MirrorError::Unavailable`] without touching the data.
#[derive(Debug, Default)]
pub struct FlakyStore {
    inner: InMemoryStore,
    fail_get: AtomicBool,
    fail_set: AtomicBool,
    fail_delete: AtomicBool,
    fail_scan: AtomicBool,
    failures: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose every operation fails.
    pub fn broken() -> Self {
        let store = Self::new();
        store.fail_all(true);
        store
    }

    pub fn fail_get(&self, fail: bool) {
        self.fail_get.store(fail, Ordering::SeqCst);
    }

    pub fn fail_set(&self, fail: bool) {
        self.fail_set.store(fail, Ordering::SeqCst);
    }

    pub fn fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn fail_scan(&self, fail: bool) {
        self.fail_scan.store(fail, Ordering::SeqCst);
    }

    pub fn fail_all(&self, fail: bool) {
        self.fail_get(fail);
        self.fail_set(fail);
        self.fail_delete(fail);
        self.fail_scan(fail);
    }

    /// Number of operations that were failed on purpose.
    pub fn failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }

    /// Underlying records, for inspection or planting raw data.
    pub fn inner(&self) -> &InMemoryStore {
        &self.inner
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> MirrorResult<()> {
        if flag.load(Ordering::SeqCst) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(MirrorError::Unavailable {
                reason: format!("injected {op} failure"),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl SecondaryStore for FlakyStore {
    async fn get(&self, key: &str) -> MirrorResult<Option<Vec<u8>>> {
        self.check(&self.fail_get, "get")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8]) -> MirrorResult<()> {
        self.check(&self.fail_set, "set")?;
        self.inner.set(key, value).await
    }

    async fn delete(&self, key: &str) -> MirrorResult<bool> {
        self.check(&self.fail_delete, "delete")?;
        self.inner.delete(key).await
    }

    async fn scan_keys_with_prefix(&self, prefix: &str) -> MirrorResult<Vec<String>> {
        self.check(&self.fail_scan, "scan")?;
        self.inner.scan_keys_with_prefix(prefix).await
    }
}

/// Error returned by [`CountingFetcher`] when told to fail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("fetch failed: {0}")]
pub struct FetchError(pub String);

/// Fallback that counts how often it runs.
#[derive(Debug)]
pub struct CountingFetcher<T> {
    value: T,
    calls: AtomicUsize,
    failing: AtomicBool,
}

impl<T: Clone> CountingFetcher<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            calls: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Make subsequent fetches fail (or succeed again).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn fetch(&self) -> Result<T, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError("upstream unavailable".to_string()));
        }
        Ok(self.value.clone())
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for cache inputs.

    use super::*;
    use proptest::prelude::*;
    use std::time::Duration;

    /// Generate a non-empty cache key shaped like `namespace_part_part`.
    pub fn arb_key() -> impl Strategy<Value = String> {
        "[a-z]{1,8}(_[a-z0-9{}]{1,6}){0,3}"
    }

    /// Generate a tag.
    pub fn arb_tag() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("members".to_string()),
            Just("events".to_string()),
            Just("donations".to_string()),
            "church_[a-z0-9]{1,6}",
        ]
    }

    /// Generate up to four tags.
    pub fn arb_tags() -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec(arb_tag(), 0..4)
    }

    /// Generate write options with a positive TTL.
    pub fn arb_options() -> impl Strategy<Value = CacheOptions> {
        (1u64..3600, arb_tags(), 1u32..5).prop_map(|(ttl, tags, version)| {
            CacheOptions::new()
                .with_ttl(Duration::from_secs(ttl))
                .with_tags(tags)
                .with_version(version)
        })
    }

    /// Generate a configuration that passes validation.
    pub fn arb_valid_config() -> impl Strategy<Value = CacheConfig> {
        (1usize..5000, 1u64..86_400, 1u32..=100, "[a-z]{1,8}_", 1usize..1024).prop_map(
            |(max_entries, ttl, percent, prefix, mb)| {
                CacheConfig::default()
                    .with_max_entries(max_entries)
                    .with_default_ttl(Duration::from_secs(ttl))
                    .with_eviction_fraction(f64::from(percent) / 100.0)
                    .with_mirror_prefix(prefix)
                    .with_mirror_max_size_mb(mb)
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use serde::{Deserialize, Serialize};

    /// One member search hit.
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    pub struct MemberHit {
        pub id: String,
        pub name: String,
        pub score: f32,
    }

    /// Key for searching church `c1` for "mary" with no filters, limit 10.
    pub fn search_key() -> String {
        khesed_core::CacheKey::search("c1", "mary", "{}", 10).render()
    }

    pub fn search_results() -> Vec<MemberHit> {
        vec![
            MemberHit {
                id: "m-101".to_string(),
                name: "Mary Johnson".to_string(),
                score: 0.98,
            },
            MemberHit {
                id: "m-207".to_string(),
                name: "Maryann Ortiz".to_string(),
                score: 0.81,
            },
        ]
    }

    /// Dashboard aggregate as served by the analytics endpoint.
    pub fn analytics_payload() -> serde_json::Value {
        serde_json::json!({
            "totalMembers": 412,
            "activeMembers": 287,
            "monthlyDonations": 18250.5,
            "upcomingEvents": 6
        })
    }

    /// Clock pinned to a known instant.
    pub fn manual_clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::default())
    }

    /// Cache over `mirror` driven by `clock`, default configuration.
    pub fn cache_with_mirror<T: khesed_cache::CacheValue>(
        clock: Arc<ManualClock>,
        mirror: Arc<dyn SecondaryStore>,
    ) -> TieredCache<T> {
        TieredCache::builder(CacheConfig::default())
            .clock(clock)
            .mirror(mirror)
            .build()
            .expect("default config is valid")
    }

    /// Memory-only cache driven by `clock`.
    pub fn memory_cache<T: khesed_cache::CacheValue>(
        clock: Arc<ManualClock>,
        config: CacheConfig,
    ) -> TieredCache<T> {
        TieredCache::builder(config)
            .clock(clock)
            .build()
            .expect("test config is valid")
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for cache results and statistics.

    use super::*;

    /// Assert that a KhesedResult is a Cache error.
    #[track_caller]
    pub fn assert_cache_error<T: std::fmt::Debug>(result: &KhesedResult<T>) {
        match result {
            Err(KhesedError::Cache(_)) => {}
            other => panic!("Expected Cache error, got: {:?}", other),
        }
    }

    /// Assert that a KhesedResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &KhesedResult<T>) {
        match result {
            Err(KhesedError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert hit and miss counters.
    #[track_caller]
    pub fn assert_counts(stats: &CacheStats, hits: u64, misses: u64) {
        assert_eq!(
            (stats.hit_count, stats.miss_count),
            (hits, misses),
            "unexpected hit/miss counts in {:?}",
            stats
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[tokio::test]
    async fn test_flaky_store_injects_failures() {
        let store = FlakyStore::new();
        store.set("cache_a", b"1").await.expect("set should succeed");

        store.fail_get(true);
        assert!(matches!(
            store.get("cache_a").await,
            Err(MirrorError::Unavailable { .. })
        ));
        store.fail_get(false);
        assert_eq!(
            store.get("cache_a").await.expect("get should succeed"),
            Some(b"1".to_vec())
        );
        assert_eq!(store.failures(), 1);
    }

    #[tokio::test]
    async fn test_broken_store_fails_everything() {
        let store = FlakyStore::broken();
        assert!(store.set("k", b"v").await.is_err());
        assert!(store.get("k").await.is_err());
        assert!(store.delete("k").await.is_err());
        assert!(store.scan_keys_with_prefix("").await.is_err());
        assert_eq!(store.failures(), 4);
        assert!(store.inner().is_empty());
    }

    #[tokio::test]
    async fn test_counting_fetcher() {
        let fetcher = CountingFetcher::new(7);
        assert_eq!(fetcher.fetch().await, Ok(7));

        fetcher.set_failing(true);
        assert!(fetcher.fetch().await.is_err());
        assert_eq!(fetcher.calls(), 2);
    }

    #[test]
    fn test_search_key_fixture() {
        assert_eq!(fixtures::search_key(), "search_c1_mary_{}_10");
    }

    #[test]
    fn test_assertion_cache_error() {
        let result: KhesedResult<()> = Err(CacheError::EmptyKey.into());
        assertions::assert_cache_error(&result);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_generated_config_is_valid(config in generators::arb_valid_config()) {
            prop_assert!(config.validate().is_ok());
        }

        #[test]
        fn prop_generated_keys_are_non_empty(key in generators::arb_key()) {
            prop_assert!(!key.is_empty());
        }

        #[test]
        fn prop_generated_options_have_ttl(options in generators::arb_options()) {
            prop_assert!(options.ttl.is_some_and(|ttl| !ttl.is_zero()));
        }
    }
}
