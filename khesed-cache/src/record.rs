//! Mirror record codec.
//!
//! A record is the JSON form of a [`CacheEntry`]. Tag sweeps only need the
//! `tags` array, so [`record_tags`] decodes that field alone.

use khesed_core::{CacheEntry, CacheError, MirrorError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Deserialize)]
struct TagProbe {
    tags: Vec<String>,
}

/// Encode an entry for the mirror.
pub fn encode_record<T: Serialize>(key: &str, entry: &CacheEntry<T>) -> Result<Vec<u8>, CacheError> {
    serde_json::to_vec(entry).map_err(|e| CacheError::Serialization {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Decode a mirror record stored under `key`.
pub fn decode_record<T: DeserializeOwned>(key: &str, bytes: &[u8]) -> Result<CacheEntry<T>, MirrorError> {
    serde_json::from_slice(bytes).map_err(|e| MirrorError::Malformed {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

/// Tags carried by a record, or `Malformed` if the record has no readable
/// `tags` array.
pub fn record_tags(key: &str, bytes: &[u8]) -> Result<Vec<String>, MirrorError> {
    serde_json::from_slice::<TagProbe>(bytes)
        .map(|probe| probe.tags)
        .map_err(|e| MirrorError::Malformed {
            key: key.to_string(),
            reason: e.to_string(),
        })
}
