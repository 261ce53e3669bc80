//! LMDB-backed secondary store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep the cache mirror in a
//! memory-mapped file so entries survive process restarts.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `get` and prefix scans
//! - Write transactions for `set` and `delete`

use std::path::Path;

use async_trait::async_trait;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use khesed_core::MirrorError;

use super::traits::{MirrorResult, SecondaryStore};

fn txn_error(e: heed::Error) -> MirrorError {
    MirrorError::Transaction {
        reason: e.to_string(),
    }
}

/// LMDB file-backed [`SecondaryStore`].
///
/// # Example
///
/// ```ignore
/// use khesed_cache::mirror::LmdbStore;
///
/// let store = LmdbStore::open("/var/lib/khesed/cache", 64)?;
/// store.set("cache_search_c1_mary_{}_10", b"{...}").await?;
/// ```
pub struct LmdbStore {
    env: Env,
    db: Database<Bytes, Bytes>,
    map_size: usize,
}

impl LmdbStore {
    /// Open (or create) an LMDB mirror.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `max_size_mb` does not fit in a byte count
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> MirrorResult<Self> {
        let map_size = max_size_mb
            .checked_mul(1024 * 1024)
            .ok_or_else(|| MirrorError::Unavailable {
                reason: format!("map size of {max_size_mb} MB overflows"),
            })?;
        std::fs::create_dir_all(&path)?;

        // SAFETY: the environment is opened once per directory by this process.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| MirrorError::Unavailable {
            reason: format!("failed to open LMDB environment: {e}"),
        })?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| MirrorError::Unavailable {
                reason: format!("failed to open database: {e}"),
            })?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self { env, db, map_size })
    }

    /// Number of records in the mirror.
    pub fn record_count(&self) -> MirrorResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        self.db.len(&rtxn).map_err(txn_error)
    }
}

#[async_trait]
impl SecondaryStore for LmdbStore {
    async fn get(&self, key: &str) -> MirrorResult<Option<Vec<u8>>> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let value = self
            .db
            .get(&rtxn, key.as_bytes())
            .map_err(txn_error)?
            .map(|bytes| bytes.to_vec());
        Ok(value)
    }

    async fn set(&self, key: &str, value: &[u8]) -> MirrorResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db
            .put(&mut wtxn, key.as_bytes(), value)
            .map_err(|e| match e {
                heed::Error::Mdb(heed::MdbError::MapFull) => MirrorError::QuotaExceeded {
                    used: value.len(),
                    limit: self.map_size,
                },
                other => txn_error(other),
            })?;
        wtxn.commit().map_err(txn_error)
    }

    async fn delete(&self, key: &str) -> MirrorResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self
            .db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    async fn scan_keys_with_prefix(&self, prefix: &str) -> MirrorResult<Vec<String>> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let prefix = prefix.as_bytes();

        let mut keys = Vec::new();
        for result in self.db.iter(&rtxn).map_err(txn_error)? {
            match result {
                Ok((key, _)) if key.starts_with(prefix) => {
                    // Keys the cache wrote are always UTF-8
                    if let Ok(key) = std::str::from_utf8(key) {
                        keys.push(key.to_string());
                    }
                }
                Ok(_) => {}
                Err(_) => continue,
            }
        }

        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbStore::open(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let (store, _temp_dir) = create_test_store();

        store
            .set("cache_k", br#"{"data":1}"#)
            .await
            .expect("set should succeed");

        let value = store.get("cache_k").await.expect("get should succeed");
        assert_eq!(value.as_deref(), Some(&br#"{"data":1}"#[..]));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let (store, _temp_dir) = create_test_store();
        assert!(store
            .get("cache_missing")
            .await
            .expect("get should succeed")
            .is_none());
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _temp_dir) = create_test_store();

        store.set("cache_k", b"1").await.expect("set should succeed");
        assert!(store.delete("cache_k").await.expect("delete should succeed"));
        assert!(!store.delete("cache_k").await.expect("delete should succeed"));
        assert_eq!(store.record_count().expect("count should succeed"), 0);
    }

    #[tokio::test]
    async fn test_scan_keys_with_prefix() {
        let (store, _temp_dir) = create_test_store();

        for key in ["cache_a", "cache_b", "session_a", "cachex"] {
            store.set(key, b"{}").await.expect("set should succeed");
        }

        let mut keys = store
            .scan_keys_with_prefix("cache_")
            .await
            .expect("scan should succeed");
        keys.sort();
        assert_eq!(keys, vec!["cache_a".to_string(), "cache_b".to_string()]);
    }

    #[tokio::test]
    async fn test_overwrite() {
        let (store, _temp_dir) = create_test_store();

        store.set("cache_k", b"old").await.expect("set should succeed");
        store.set("cache_k", b"new").await.expect("set should succeed");

        assert_eq!(
            store.get("cache_k").await.expect("get should succeed"),
            Some(b"new".to_vec())
        );
        assert_eq!(store.record_count().expect("count should succeed"), 1);
    }

    #[test]
    fn test_oversized_map_is_rejected() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let result = LmdbStore::open(temp_dir.path().join("huge"), usize::MAX);
        assert!(matches!(result, Err(MirrorError::Unavailable { .. })));
        assert!(!temp_dir.path().join("huge").exists());
    }

    #[tokio::test]
    async fn test_survives_reopen() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let store = LmdbStore::open(temp_dir.path(), 10).expect("open should succeed");
            store.set("cache_k", b"persisted").await.expect("set should succeed");
        }

        let reopened = LmdbStore::open(temp_dir.path(), 10).expect("reopen should succeed");
        assert_eq!(
            reopened.get("cache_k").await.expect("get should succeed"),
            Some(b"persisted".to_vec())
        );
    }
}
