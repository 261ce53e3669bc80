//! Tiered cache: bounded in-memory map in front of an optional mirror.
//!
//! Reads check memory first, then the mirror, and promote valid mirror
//! records back into memory. Staleness is checked lazily on read; nothing
//! sweeps in the background.
//!
//! The memory lock is never held across an `.await`. Fallbacks run outside
//! it, so two concurrent misses on one key may both compute and both write
//! (last write wins).

use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use khesed_core::{
    CacheConfig, CacheEntry, CacheError, CacheOptions, Clock, EpochMillis, KhesedResult,
    SystemClock,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::mirror::SecondaryStore;
use crate::record::{decode_record, encode_record, record_tags};
use crate::stats::CacheStats;

/// Values a [`TieredCache`] can hold.
///
/// Values must be serializable so they can be mirrored and sized, and
/// cloneable because callers receive copies, never references into the map.
pub trait CacheValue: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheValue for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// One memory slot. `seq` breaks `created_at` ties in insertion order.
#[derive(Debug)]
struct Slot<T> {
    entry: CacheEntry<T>,
    seq: u64,
}

#[derive(Debug)]
struct MemoryTier<T> {
    slots: HashMap<String, Slot<T>>,
    next_seq: u64,
}

impl<T> Default for MemoryTier<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
            next_seq: 0,
        }
    }
}

impl<T> MemoryTier<T> {
    fn insert(&mut self, key: String, entry: CacheEntry<T>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.slots.insert(key, Slot { entry, seq });
    }

    /// Remove the `count` oldest entries by `(created_at, seq)`.
    fn evict_oldest(&mut self, count: usize) -> usize {
        if count == 0 {
            return 0;
        }

        let mut order: Vec<(EpochMillis, u64, &String)> = self
            .slots
            .iter()
            .map(|(key, slot)| (slot.entry.created_at, slot.seq, key))
            .collect();
        order.sort_unstable_by_key(|&(created_at, seq, _)| (created_at, seq));

        let victims: Vec<String> = order
            .into_iter()
            .take(count)
            .map(|(_, _, key)| key.clone())
            .collect();

        for key in &victims {
            self.slots.remove(key);
        }
        victims.len()
    }
}

/// Outcome of a memory-tier lookup.
enum Lookup<T> {
    Fresh(T),
    Stale,
    Absent,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

/// Multi-tier request cache with tag-based invalidation.
///
/// Construct one per payload type and inject it where it is needed; clones
/// share the same state.
///
/// # Example
///
/// ```ignore
/// let cache: TieredCache<Vec<SearchHit>> = TieredCache::builder(CacheConfig::default())
///     .mirror(Arc::new(InMemoryStore::new()))
///     .build()?;
///
/// let key = CacheKey::search(church_id, query, &filters_json, limit).render();
/// let hits = cache.get_or_fetch(&key, || run_search(church_id, query)).await?;
/// ```
pub struct TieredCache<T: CacheValue> {
    memory: Arc<Mutex<MemoryTier<T>>>,
    mirror: Option<Arc<dyn SecondaryStore>>,
    clock: Arc<dyn Clock>,
    config: Arc<CacheConfig>,
    /// Prefix prepended to keys in the mirror.
    prefix: Arc<str>,
    counters: Arc<Counters>,
}

impl<T: CacheValue> TieredCache<T> {
    /// Create a memory-only cache using the system clock.
    pub fn new(config: CacheConfig) -> KhesedResult<Self> {
        Self::builder(config).build()
    }

    /// Memory-only cache with default configuration.
    pub fn with_defaults() -> Self {
        Self::builder(CacheConfig::default()).assemble()
    }

    pub fn builder(config: CacheConfig) -> TieredCacheBuilder<T> {
        TieredCacheBuilder::new(config)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Prefix this cache uses for mirror keys.
    pub fn mirror_prefix(&self) -> &str {
        &self.prefix
    }

    pub fn has_mirror(&self) -> bool {
        self.mirror.is_some()
    }

    /// Number of entries in memory, stale ones included.
    pub fn len(&self) -> usize {
        self.memory().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether memory holds an entry for `key`, without touching stats or
    /// checking freshness.
    pub fn contains_key(&self, key: &str) -> bool {
        self.memory().slots.contains_key(key)
    }

    /// Look up `key`, consulting memory then the mirror.
    ///
    /// Returns `None` on a miss. A stale entry is removed from both tiers
    /// before the miss is reported.
    pub async fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now_millis();

        match self.lookup_memory(key, now) {
            Lookup::Fresh(data) => {
                self.record_hit();
                tracing::debug!(key = %key, tier = "memory", "cache hit");
                return Some(data);
            }
            Lookup::Stale => {
                tracing::debug!(key = %key, "cache entry expired");
                self.delete_from_mirror(key).await;
                self.record_miss();
                return None;
            }
            Lookup::Absent => {}
        }

        match self.load_from_mirror(key).await {
            Some(entry) if entry.is_valid_at(now) => {
                let data = self.promote(key, entry, now);
                self.record_hit();
                tracing::debug!(key = %key, tier = "mirror", "cache hit, promoted to memory");
                Some(data)
            }
            Some(_) => {
                tracing::debug!(key = %key, "mirror entry expired");
                self.delete_from_mirror(key).await;
                self.record_miss();
                None
            }
            None => {
                tracing::debug!(key = %key, "cache miss");
                self.record_miss();
                None
            }
        }
    }

    /// Look up `key`, computing and caching it with default options on a miss.
    ///
    /// A fallback error is returned unchanged and nothing is cached.
    pub async fn get_or_fetch<F, Fut, E>(&self, key: &str, fallback: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.get_or_fetch_with(key, CacheOptions::default(), fallback)
            .await
    }

    /// Like [`get_or_fetch`](Self::get_or_fetch), storing the computed value
    /// with `options`.
    pub async fn get_or_fetch_with<F, Fut, E>(
        &self,
        key: &str,
        options: CacheOptions,
        fallback: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(data) = self.get(key).await {
            return Ok(data);
        }

        let data = fallback().await?;
        if let Err(e) = self.set(key, data.clone(), options).await {
            tracing::warn!(key = %key, error = %e, "failed to cache fallback result");
        }
        Ok(data)
    }

    /// Drop `key`, recompute it and store the fresh value with `options`.
    ///
    /// On fetch failure the key stays absent and the error is returned.
    pub async fn refresh<F, Fut, E>(&self, key: &str, options: CacheOptions, fetch: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.delete(key).await;

        let data = fetch().await?;
        if let Err(e) = self.set(key, data.clone(), options).await {
            tracing::warn!(key = %key, error = %e, "failed to cache refreshed value");
        }
        Ok(data)
    }

    /// Create or overwrite the entry for `key`.
    ///
    /// Memory is written first and may trigger a batch eviction. The mirror
    /// write is best-effort; its failures are logged, never returned.
    ///
    /// # Errors
    ///
    /// - [`CacheError::EmptyKey`] if `key` is empty
    /// - [`CacheError::InvalidTtl`] if the effective TTL is under one millisecond
    pub async fn set(&self, key: &str, data: T, options: CacheOptions) -> KhesedResult<()> {
        if key.is_empty() {
            return Err(CacheError::EmptyKey.into());
        }

        let ttl = options.ttl.unwrap_or(self.config.default_ttl);
        // Entries store whole milliseconds
        if ttl.as_millis() == 0 {
            return Err(CacheError::InvalidTtl {
                ttl_secs: ttl.as_secs(),
            }
            .into());
        }

        let entry = CacheEntry::new(
            data,
            self.clock.now_millis(),
            ttl,
            options.tags,
            options.version,
        );

        let record = self.mirror.as_ref().map(|_| encode_record(key, &entry));
        self.insert_memory(key, entry);

        if let (Some(mirror), Some(record)) = (&self.mirror, record) {
            match record {
                Ok(bytes) => {
                    if let Err(e) = mirror.set(&self.mirror_key(key), &bytes).await {
                        tracing::warn!(key = %key, error = %e, "failed to write cache mirror");
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "skipping cache mirror write");
                }
            }
        }

        Ok(())
    }

    /// Remove `key` from memory and the mirror. No-op when absent.
    pub async fn delete(&self, key: &str) {
        self.memory().slots.remove(key);
        self.delete_from_mirror(key).await;
    }

    /// Remove every entry tagged `tag`, in memory and in the mirror.
    ///
    /// Mirror records under this cache's prefix that cannot be parsed are
    /// removed as well. Returns the number of memory entries removed.
    pub async fn invalidate_by_tag(&self, tag: &str) -> u64 {
        let removed: Vec<String> = {
            let mut memory = self.memory();
            let keys: Vec<String> = memory
                .slots
                .iter()
                .filter(|(_, slot)| slot.entry.has_tag(tag))
                .map(|(key, _)| key.clone())
                .collect();
            for key in &keys {
                memory.slots.remove(key);
            }
            keys
        };

        for key in &removed {
            self.delete_from_mirror(key).await;
        }

        let swept = self.sweep_mirror_by_tag(tag).await;
        tracing::debug!(
            tag = %tag,
            memory_removed = removed.len(),
            mirror_removed = swept,
            "invalidated cache tag"
        );

        removed.len() as u64
    }

    /// Remove every memory entry and every mirror record under this cache's
    /// prefix. Statistics are kept.
    pub async fn clear(&self) {
        self.memory().slots.clear();

        let Some(mirror) = &self.mirror else {
            return;
        };

        let keys = match mirror.scan_keys_with_prefix(&self.prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "failed to scan cache mirror for clear");
                return;
            }
        };

        for mirror_key in keys {
            if let Err(e) = mirror.delete(&mirror_key).await {
                tracing::warn!(key = %mirror_key, error = %e, "failed to clear cache mirror record");
            }
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        let (entries, bytes) = {
            let memory = self.memory();
            let bytes: usize = memory
                .slots
                .values()
                .map(|slot| serde_json::to_vec(&slot.entry).map(|v| v.len()).unwrap_or(0))
                .sum();
            (memory.slots.len(), bytes)
        };

        CacheStats::new(
            self.counters.hits.load(Ordering::Relaxed),
            self.counters.misses.load(Ordering::Relaxed),
            entries,
            // Two bytes per character, matching the UTF-16 estimate dashboards expect
            bytes * 2,
            self.counters.evictions.load(Ordering::Relaxed),
        )
    }

    // ------------------------------------------------------------------
    // Internals. None of these hold the memory lock across an await.
    // ------------------------------------------------------------------

    fn memory(&self) -> MutexGuard<'_, MemoryTier<T>> {
        self.memory.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn mirror_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Stale slots are removed while the lock is still held, so a write that
    /// lands after this returns is never dropped.
    fn lookup_memory(&self, key: &str, now: EpochMillis) -> Lookup<T> {
        let mut memory = self.memory();
        let Some(slot) = memory.slots.get(key) else {
            return Lookup::Absent;
        };
        if slot.entry.is_valid_at(now) {
            return Lookup::Fresh(slot.entry.data.clone());
        }
        memory.slots.remove(key);
        Lookup::Stale
    }

    fn insert_memory(&self, key: &str, entry: CacheEntry<T>) {
        let evicted = {
            let mut memory = self.memory();
            memory.insert(key.to_string(), entry);
            self.enforce_capacity(&mut memory)
        };
        self.record_evictions(evicted);
    }

    /// Move a mirror record into memory unless a fresh entry was written
    /// while the mirror read was in flight. Returns the value now in memory.
    fn promote(&self, key: &str, entry: CacheEntry<T>, now: EpochMillis) -> T {
        let (data, evicted) = {
            let mut memory = self.memory();
            let current = memory
                .slots
                .get(key)
                .filter(|slot| slot.entry.is_valid_at(now))
                .map(|slot| slot.entry.data.clone());

            match current {
                Some(data) => (data, 0),
                None => {
                    let data = entry.data.clone();
                    memory.insert(key.to_string(), entry);
                    (data, self.enforce_capacity(&mut memory))
                }
            }
        };
        self.record_evictions(evicted);
        data
    }

    fn enforce_capacity(&self, memory: &mut MemoryTier<T>) -> usize {
        let len = memory.slots.len();
        if len > self.config.max_entries {
            memory.evict_oldest(self.config.eviction_batch(len).max(1))
        } else {
            0
        }
    }

    fn record_evictions(&self, evicted: usize) {
        if evicted > 0 {
            self.counters
                .evictions
                .fetch_add(evicted as u64, Ordering::Relaxed);
            tracing::debug!(evicted, max_entries = self.config.max_entries, "evicted oldest cache entries");
        }
    }

    async fn load_from_mirror(&self, key: &str) -> Option<CacheEntry<T>> {
        let mirror = self.mirror.as_ref()?;

        let bytes = match mirror.get(&self.mirror_key(key)).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "failed to read cache mirror");
                return None;
            }
        };

        match decode_record(key, &bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "ignoring cache mirror record");
                None
            }
        }
    }

    async fn delete_from_mirror(&self, key: &str) {
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.delete(&self.mirror_key(key)).await {
                tracing::warn!(key = %key, error = %e, "failed to delete cache mirror record");
            }
        }
    }

    /// Remove mirror records under the prefix that carry `tag` or fail to
    /// parse. Returns the number removed.
    async fn sweep_mirror_by_tag(&self, tag: &str) -> usize {
        let Some(mirror) = &self.mirror else {
            return 0;
        };

        let keys = match mirror.scan_keys_with_prefix(&self.prefix).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(tag = %tag, error = %e, "failed to scan cache mirror");
                return 0;
            }
        };

        let mut removed = 0;
        for mirror_key in keys {
            let matches = match mirror.get(&mirror_key).await {
                Ok(Some(bytes)) => record_matches_tag(&mirror_key, &bytes, tag),
                Ok(None) => false,
                Err(e) => {
                    tracing::warn!(key = %mirror_key, error = %e, "failed to read cache mirror");
                    false
                }
            };

            if !matches {
                continue;
            }
            match mirror.delete(&mirror_key).await {
                Ok(_) => removed += 1,
                Err(e) => {
                    tracing::warn!(key = %mirror_key, error = %e, "failed to delete cache mirror record");
                }
            }
        }
        removed
    }

    fn record_hit(&self) {
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
    }
}

/// A record matches when it carries `tag` or cannot be parsed at all.
fn record_matches_tag(mirror_key: &str, bytes: &[u8], tag: &str) -> bool {
    match record_tags(mirror_key, bytes) {
        Ok(tags) => tags.iter().any(|t| t == tag),
        Err(e) => {
            tracing::debug!(error = %e, "removing unreadable cache mirror record");
            true
        }
    }
}

impl<T: CacheValue> Clone for TieredCache<T> {
    fn clone(&self) -> Self {
        Self {
            memory: Arc::clone(&self.memory),
            mirror: self.mirror.clone(),
            clock: Arc::clone(&self.clock),
            config: Arc::clone(&self.config),
            prefix: Arc::clone(&self.prefix),
            counters: Arc::clone(&self.counters),
        }
    }
}

/// Builder for [`TieredCache`].
pub struct TieredCacheBuilder<T> {
    config: CacheConfig,
    clock: Option<Arc<dyn Clock>>,
    mirror: Option<Arc<dyn SecondaryStore>>,
    prefix: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: CacheValue> TieredCacheBuilder<T> {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            clock: None,
            mirror: None,
            prefix: None,
            _marker: PhantomData,
        }
    }

    /// Time source for entry timestamps. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Attach a secondary store as the mirror tier.
    pub fn mirror(mut self, mirror: Arc<dyn SecondaryStore>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Attach a mirror only if one is given.
    pub fn maybe_mirror(mut self, mirror: Option<Arc<dyn SecondaryStore>>) -> Self {
        self.mirror = mirror;
        self
    }

    /// Override the mirror key prefix. Defaults to `config.mirror_prefix`.
    pub fn mirror_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }

    /// Validate the configuration and build the cache.
    pub fn build(self) -> KhesedResult<TieredCache<T>> {
        self.config.validate()?;
        Ok(self.assemble())
    }

    fn assemble(self) -> TieredCache<T> {
        let prefix = self
            .prefix
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| self.config.mirror_prefix.clone());

        TieredCache {
            memory: Arc::new(Mutex::new(MemoryTier::default())),
            mirror: self.mirror,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: Arc::new(self.config),
            prefix: Arc::from(prefix),
            counters: Arc::new(Counters::default()),
        }
    }
}
