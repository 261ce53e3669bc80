//! Khesed Cache - Tiered Request Cache
//!
//! A bounded in-memory cache for expensive computations such as search
//! results and analytics aggregates, with:
//!
//! - per-entry TTLs, checked lazily on read
//! - tag-based bulk invalidation
//! - batch eviction of the oldest entries when capacity is exceeded
//! - an optional best-effort mirror ([`SecondaryStore`]) that survives
//!   restarts and repopulates memory on read
//! - hit/miss statistics
//!
//! # Example
//!
//! ```ignore
//! use khesed_cache::{CacheContext, JsonCache};
//! use khesed_core::{church_tag, CacheConfig, CacheKey, CacheOptions};
//!
//! let ctx = CacheContext::new(CacheConfig::from_env())?;
//! let search: JsonCache = ctx.cache("search")?;
//!
//! let key = CacheKey::search("c1", "mary", "{}", 10).render();
//! let results = search
//!     .get_or_fetch_with(&key, CacheOptions::new().with_tag(church_tag("c1")), || run_search())
//!     .await?;
//! ```

pub mod context;
pub mod memoize;
pub mod mirror;
pub mod preload;
pub mod record;
pub mod stats;
pub mod telemetry;
pub mod tiered;

pub use context::{CacheContext, JsonCache};
pub use memoize::{with_cache, CachedFn};
pub use mirror::{InMemoryStore, LmdbStore, MirrorResult, SecondaryStore};
pub use preload::{
    preload, preload_church_data, ChurchDataset, LoadError, PreloadFailure, PreloadReport,
    PreloadTask,
};
pub use record::{decode_record, encode_record, record_tags};
pub use stats::{hit_rate_percent, CacheStats};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig, TelemetryError};
pub use tiered::{CacheValue, TieredCache, TieredCacheBuilder};
