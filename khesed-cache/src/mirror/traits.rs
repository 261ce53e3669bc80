//! Secondary store trait.
//!
//! The cache mirrors entries into a [`SecondaryStore`] on a best-effort basis.
//! The store only moves bytes; record encoding, key prefixing and tag
//! matching all belong to the cache.

use async_trait::async_trait;
use khesed_core::MirrorError;

/// Result type for secondary store operations.
pub type MirrorResult<T> = Result<T, MirrorError>;

/// Persistent key/value capability backing the cache mirror.
///
/// Implementations must be thread-safe. Nothing about them is authoritative:
/// the cache swallows every error returned here and treats the mirror as
/// unavailable for that call.
///
/// # Key Format
///
/// Keys arrive already prefixed by the cache (`cache_` by default). Stores
/// keep them verbatim and must return them verbatim from
/// [`scan_keys_with_prefix`](SecondaryStore::scan_keys_with_prefix).
#[async_trait]
pub trait SecondaryStore: Send + Sync {
    /// Read the raw record stored under `key`.
    async fn get(&self, key: &str) -> MirrorResult<Option<Vec<u8>>>;

    /// Create or overwrite the record under `key`.
    async fn set(&self, key: &str, value: &[u8]) -> MirrorResult<()>;

    /// Remove the record under `key`. Returns whether a record existed.
    async fn delete(&self, key: &str) -> MirrorResult<bool>;

    /// List every key starting with `prefix`.
    async fn scan_keys_with_prefix(&self, prefix: &str) -> MirrorResult<Vec<String>>;
}
