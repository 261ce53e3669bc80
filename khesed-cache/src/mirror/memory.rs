//! In-process secondary store.
//!
//! Behaves like a browser's local storage: a flat string-keyed map with an
//! optional byte quota. Useful as a mirror for tests and for processes that
//! reuse one store across several cache instances.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;
use khesed_core::MirrorError;

use super::traits::{MirrorResult, SecondaryStore};

/// Map-backed [`SecondaryStore`] with an optional quota.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<BTreeMap<String, Vec<u8>>>,
    /// Maximum total bytes (keys plus values). `None` means unbounded.
    quota_bytes: Option<usize>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store that rejects writes once keys plus values would exceed
    /// `quota_bytes`.
    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            quota_bytes: Some(quota_bytes),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently used by keys plus values.
    pub fn used_bytes(&self) -> usize {
        self.records
            .read()
            .map(|r| r.iter().map(|(k, v)| k.len() + v.len()).sum())
            .unwrap_or(0)
    }

    /// Store raw bytes directly, bypassing the quota. Lets tests plant
    /// records the cache would never write itself.
    pub fn insert_raw(&self, key: impl Into<String>, value: impl Into<Vec<u8>>) {
        if let Ok(mut records) = self.records.write() {
            records.insert(key.into(), value.into());
        }
    }

    /// Snapshot of every stored key.
    pub fn keys(&self) -> Vec<String> {
        self.records
            .read()
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn poisoned() -> MirrorError {
    MirrorError::Unavailable {
        reason: "in-memory store lock poisoned".to_string(),
    }
}

#[async_trait]
impl SecondaryStore for InMemoryStore {
    async fn get(&self, key: &str) -> MirrorResult<Option<Vec<u8>>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> MirrorResult<()> {
        let mut records = self.records.write().map_err(|_| poisoned())?;

        if let Some(limit) = self.quota_bytes {
            let replaced = records.get(key).map(|v| key.len() + v.len()).unwrap_or(0);
            let current: usize = records.iter().map(|(k, v)| k.len() + v.len()).sum();
            let used = current - replaced + key.len() + value.len();
            if used > limit {
                return Err(MirrorError::QuotaExceeded { used, limit });
            }
        }

        records.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn delete(&self, key: &str) -> MirrorResult<bool> {
        let mut records = self.records.write().map_err(|_| poisoned())?;
        Ok(records.remove(key).is_some())
    }

    async fn scan_keys_with_prefix(&self, prefix: &str) -> MirrorResult<Vec<String>> {
        let records = self.records.read().map_err(|_| poisoned())?;
        Ok(records
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = InMemoryStore::new();
        store.set("cache_a", b"1").await.expect("set should succeed");

        assert_eq!(
            store.get("cache_a").await.expect("get should succeed"),
            Some(b"1".to_vec())
        );
        assert!(store.delete("cache_a").await.expect("delete should succeed"));
        assert!(!store.delete("cache_a").await.expect("delete should succeed"));
        assert!(store.get("cache_a").await.expect("get should succeed").is_none());
    }

    #[tokio::test]
    async fn test_scan_prefix() {
        let store = InMemoryStore::new();
        for key in ["cache_a", "cache_b", "cachex", "other_cache_c", "cache_"] {
            store.set(key, b"{}").await.expect("set should succeed");
        }

        let keys = store
            .scan_keys_with_prefix("cache_")
            .await
            .expect("scan should succeed");
        assert_eq!(keys, vec!["cache_", "cache_a", "cache_b"]);
    }

    #[tokio::test]
    async fn test_quota_exceeded() {
        let store = InMemoryStore::with_quota(16);
        store.set("k1", b"12345678").await.expect("fits in quota");

        let err = store.set("k2", b"12345678").await.unwrap_err();
        assert!(matches!(err, MirrorError::QuotaExceeded { used: 20, limit: 16 }));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_quota_counts_overwrite_once() {
        let store = InMemoryStore::with_quota(12);
        store.set("k1", b"1234567890").await.expect("fits");
        // Replacing the same key must not double count the old value
        store.set("k1", b"0987654321").await.expect("overwrite fits");
        assert_eq!(store.used_bytes(), 12);
    }

    #[test]
    fn test_insert_raw_bypasses_quota() {
        let store = InMemoryStore::with_quota(1);
        store.insert_raw("cache_bad", "not json");
        assert_eq!(store.keys(), vec!["cache_bad".to_string()]);
        assert!(!store.is_empty());
    }
}
