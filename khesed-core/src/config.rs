//! Cache configuration
//!
//! Loaded from environment variables with defaults that match the
//! application's historical behavior (1000 entries, 5 minute TTL, evict the
//! oldest 20% on overflow, mirror records prefixed with `cache_`).

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, KhesedError, KhesedResult};

pub const DEFAULT_MAX_ENTRIES: usize = 1000;
pub const DEFAULT_TTL_SECS: u64 = 300;
pub const DEFAULT_EVICTION_FRACTION: f64 = 0.2;
pub const DEFAULT_MIRROR_PREFIX: &str = "cache_";
pub const DEFAULT_MIRROR_MAX_SIZE_MB: usize = 64;

/// Configuration for a tiered cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// In-memory capacity before a batch eviction runs.
    pub max_entries: usize,
    /// TTL applied when a write does not specify one.
    pub default_ttl: Duration,
    /// Share of entries (oldest first) dropped when capacity is exceeded.
    pub eviction_fraction: f64,
    /// Prefix prepended to every key in the mirror store.
    pub mirror_prefix: String,
    /// Directory for the LMDB mirror. `None` disables the mirror.
    pub mirror_path: Option<PathBuf>,
    /// LMDB map size in megabytes.
    pub mirror_max_size_mb: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES,
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            eviction_fraction: DEFAULT_EVICTION_FRACTION,
            mirror_prefix: DEFAULT_MIRROR_PREFIX.to_string(),
            mirror_path: None,
            mirror_max_size_mb: DEFAULT_MIRROR_MAX_SIZE_MB,
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create CacheConfig from environment variables.
    ///
    /// Environment variables:
    /// - `KHESED_CACHE_MAX_ENTRIES`: In-memory capacity (default: 1000)
    /// - `KHESED_CACHE_DEFAULT_TTL_SECS`: Default TTL in seconds (default: 300)
    /// - `KHESED_CACHE_EVICTION_FRACTION`: Share evicted on overflow (default: 0.2)
    /// - `KHESED_CACHE_MIRROR_PREFIX`: Mirror key prefix (default: "cache_")
    /// - `KHESED_CACHE_MIRROR_PATH`: LMDB mirror directory (default: unset, no mirror)
    /// - `KHESED_CACHE_MIRROR_MAX_SIZE_MB`: LMDB map size (default: 64)
    ///
    /// Unparseable values fall back to the default. Call [`validate`](Self::validate)
    /// to reject out-of-range values.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_entries = env_parse("KHESED_CACHE_MAX_ENTRIES").unwrap_or(defaults.max_entries);

        let default_ttl = env_parse::<u64>("KHESED_CACHE_DEFAULT_TTL_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.default_ttl);

        let eviction_fraction =
            env_parse("KHESED_CACHE_EVICTION_FRACTION").unwrap_or(defaults.eviction_fraction);

        let mirror_prefix = std::env::var("KHESED_CACHE_MIRROR_PREFIX")
            .ok()
            .filter(|s| !s.is_empty())
            .unwrap_or(defaults.mirror_prefix);

        let mirror_path = std::env::var("KHESED_CACHE_MIRROR_PATH")
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .map(PathBuf::from);

        let mirror_max_size_mb =
            env_parse("KHESED_CACHE_MIRROR_MAX_SIZE_MB").unwrap_or(defaults.mirror_max_size_mb);

        Self {
            max_entries,
            default_ttl,
            eviction_fraction,
            mirror_prefix,
            mirror_path,
            mirror_max_size_mb,
        }
    }

    pub fn with_max_entries(mut self, max: usize) -> Self {
        self.max_entries = max;
        self
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_eviction_fraction(mut self, fraction: f64) -> Self {
        self.eviction_fraction = fraction;
        self
    }

    pub fn with_mirror_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.mirror_prefix = prefix.into();
        self
    }

    pub fn with_mirror_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mirror_path = Some(path.into());
        self
    }

    pub fn with_mirror_max_size_mb(mut self, mb: usize) -> Self {
        self.mirror_max_size_mb = mb;
        self
    }

    /// Number of entries one overflow eviction removes for a map of `len`.
    pub fn eviction_batch(&self, len: usize) -> usize {
        (len as f64 * self.eviction_fraction).floor() as usize
    }

    /// Validate the configuration.
    ///
    /// Validates:
    /// - max_entries > 0
    /// - default_ttl is positive
    /// - eviction_fraction in (0.0, 1.0]
    /// - mirror_prefix is not empty
    /// - mirror_max_size_mb > 0
    pub fn validate(&self) -> KhesedResult<()> {
        if self.max_entries == 0 {
            return Err(invalid(
                "max_entries",
                self.max_entries.to_string(),
                "max_entries must be greater than 0",
            ));
        }

        if self.default_ttl.is_zero() {
            return Err(invalid(
                "default_ttl",
                format!("{:?}", self.default_ttl),
                "default_ttl must be positive",
            ));
        }

        if !(self.eviction_fraction > 0.0 && self.eviction_fraction <= 1.0) {
            return Err(invalid(
                "eviction_fraction",
                self.eviction_fraction.to_string(),
                "eviction_fraction must be in (0.0, 1.0]",
            ));
        }

        if self.mirror_prefix.is_empty() {
            return Err(KhesedError::Config(ConfigError::MissingRequired {
                field: "mirror_prefix".to_string(),
            }));
        }

        if self.mirror_max_size_mb == 0 {
            return Err(invalid(
                "mirror_max_size_mb",
                self.mirror_max_size_mb.to_string(),
                "mirror_max_size_mb must be greater than 0",
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, value: String, reason: &str) -> KhesedError {
    KhesedError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value,
        reason: reason.to_string(),
    })
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}
