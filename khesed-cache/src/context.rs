//! Application-level cache context.
//!
//! Owns the pieces every cache in a process shares (configuration, clock and
//! the optional mirror) and hands out typed caches per namespace. Held in
//! application state and cloned into handlers.

use std::sync::Arc;

use khesed_core::{CacheConfig, Clock, ConfigError, KhesedResult, SystemClock};

use crate::mirror::{LmdbStore, SecondaryStore};
use crate::tiered::{CacheValue, TieredCache};

/// Cache of arbitrary JSON payloads.
pub type JsonCache = TieredCache<serde_json::Value>;

/// Shared configuration, clock and mirror for a process's caches.
#[derive(Clone)]
pub struct CacheContext {
    config: Arc<CacheConfig>,
    clock: Arc<dyn Clock>,
    mirror: Option<Arc<dyn SecondaryStore>>,
}

impl CacheContext {
    /// Build a context from `config`.
    ///
    /// When `mirror_path` is set an LMDB mirror is opened there. If it cannot
    /// be opened the context runs memory-only.
    pub fn new(config: CacheConfig) -> KhesedResult<Self> {
        config.validate()?;

        let mirror: Option<Arc<dyn SecondaryStore>> = match &config.mirror_path {
            Some(path) => match LmdbStore::open(path, config.mirror_max_size_mb) {
                Ok(store) => {
                    tracing::debug!(path = %path.display(), "opened cache mirror");
                    Some(Arc::new(store))
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "cache mirror unavailable, running memory-only"
                    );
                    None
                }
            },
            None => None,
        };

        Ok(Self {
            config: Arc::new(config),
            clock: Arc::new(SystemClock),
            mirror,
        })
    }

    /// Build a context from `KHESED_CACHE_*` environment variables.
    pub fn from_env() -> KhesedResult<Self> {
        Self::new(CacheConfig::from_env())
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the mirror, e.g. with a store shared by another subsystem.
    pub fn with_mirror(mut self, mirror: Arc<dyn SecondaryStore>) -> Self {
        self.mirror = Some(mirror);
        self
    }

    pub fn without_mirror(mut self) -> Self {
        self.mirror = None;
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn mirror(&self) -> Option<&Arc<dyn SecondaryStore>> {
        self.mirror.as_ref()
    }

    /// Mirror prefix for caches in `namespace`: `{mirror_prefix}{namespace}_`.
    pub fn namespace_prefix(&self, namespace: &str) -> String {
        format!("{}{}_", self.config.mirror_prefix, namespace)
    }

    /// Create a cache whose mirror records live under this namespace's prefix.
    ///
    /// Each call returns a fresh memory tier; keep the returned cache and
    /// clone it rather than calling this per request.
    pub fn cache<T: CacheValue>(&self, namespace: &str) -> KhesedResult<TieredCache<T>> {
        if namespace.is_empty() || namespace.contains('_') {
            return Err(ConfigError::InvalidValue {
                field: "namespace".to_string(),
                value: namespace.to_string(),
                reason: "must be non-empty and must not contain '_'".to_string(),
            }
            .into());
        }

        TieredCache::builder(CacheConfig::clone(&self.config))
            .clock(Arc::clone(&self.clock))
            .maybe_mirror(self.mirror.clone())
            .mirror_prefix(self.namespace_prefix(namespace))
            .build()
    }
}

impl std::fmt::Debug for CacheContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheContext")
            .field("config", &self.config)
            .field("has_mirror", &self.mirror.is_some())
            .finish()
    }
}
