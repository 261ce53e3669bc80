//! Secondary stores for the cache mirror.
//!
//! The mirror is a best-effort, non-authoritative replica of cache entries.
//! Two stores ship with the crate:
//!
//! - [`InMemoryStore`] - process-local map with an optional byte quota
//! - [`LmdbStore`] - memory-mapped file that survives restarts

pub mod lmdb;
pub mod memory;
pub mod traits;

pub use lmdb::LmdbStore;
pub use memory::InMemoryStore;
pub use traits::{MirrorResult, SecondaryStore};
