//! Cache statistics.

use serde::Serialize;

/// Snapshot of cache usage.
///
/// Serializes with the field names dashboards already consume
/// (`hitCount`, `missCount`, `hitRate`, `memoryEntries`, `memoryUsageEstimateKB`).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    /// Number of cache hits.
    pub hit_count: u64,
    /// Number of cache misses.
    pub miss_count: u64,
    /// Hit percentage (0.0 to 100.0), rounded to two decimals.
    pub hit_rate: f64,
    /// Number of entries currently in memory.
    pub memory_entries: usize,
    /// Rough serialized size of the memory tier in KB.
    #[serde(rename = "memoryUsageEstimateKB")]
    pub memory_usage_kb: u64,
    /// Entries dropped by capacity eviction.
    pub evictions: u64,
}

impl CacheStats {
    pub fn new(
        hit_count: u64,
        miss_count: u64,
        memory_entries: usize,
        estimated_bytes: usize,
        evictions: u64,
    ) -> Self {
        Self {
            hit_count,
            miss_count,
            hit_rate: hit_rate_percent(hit_count, miss_count),
            memory_entries,
            memory_usage_kb: (estimated_bytes as f64 / 1024.0).round() as u64,
            evictions,
        }
    }

    pub fn total_lookups(&self) -> u64 {
        self.hit_count + self.miss_count
    }
}

/// `hits / (hits + misses) * 100`, rounded to two decimals; zero before any lookup.
pub fn hit_rate_percent(hits: u64, misses: u64) -> f64 {
    let total = hits + misses;
    if total == 0 {
        return 0.0;
    }
    let rate = hits as f64 / total as f64 * 100.0;
    (rate * 100.0).round() / 100.0
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Property: hit rate stays within [0, 100] and has at most two decimals.
        #[test]
        fn prop_hit_rate_bounds(hits in 0u64..1_000_000, misses in 0u64..1_000_000) {
            let rate = hit_rate_percent(hits, misses);
            prop_assert!((0.0..=100.0).contains(&rate));
            let scaled = rate * 100.0;
            prop_assert!((scaled - scaled.round()).abs() < 1e-6);
        }
    }
}
