//! Khesed Core - Cache Types
//!
//! Pure data structures shared by the cache and its callers: entries, write
//! options, configuration, errors, the clock abstraction and key builders.
//! No storage and no I/O live here.

pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod key;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use entry::{CacheEntry, CacheOptions, DEFAULT_VERSION};
pub use error::{CacheError, ConfigError, KhesedError, KhesedResult, MirrorError};
pub use key::{church_tag, CacheKey};

/// Unix epoch milliseconds, the unit of every entry timestamp.
pub type EpochMillis = i64;
