//! Fuzz test for mirror record decoding
//!
//! Mirror records come from storage the cache does not own, so decoding must
//! reject anything malformed without panicking.
//!
//! Run with: cargo +nightly fuzz run record_fuzz -- -max_total_time=60

#![no_main]

use khesed_cache::{decode_record, encode_record, record_tags};
use khesed_core::CacheEntry;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let tags = record_tags("fuzz", data);

    if let Ok(entry) = decode_record::<serde_json::Value>("fuzz", data) {
        // Anything that decodes as an entry also exposes its tags
        assert!(tags.is_ok(), "decoded entry without readable tags");

        // Re-encoding a decoded entry yields an equal entry
        let bytes = encode_record("fuzz", &entry).expect("decoded entry re-encodes");
        let again: CacheEntry<serde_json::Value> =
            decode_record("fuzz", &bytes).expect("re-encoded entry decodes");
        assert_eq!(entry.created_at, again.created_at);
        assert_eq!(entry.ttl_millis, again.ttl_millis);
        assert_eq!(entry.tags, again.tags);

        // Freshness checks must not overflow on extreme timestamps
        let _ = entry.is_valid_at(i64::MIN);
        let _ = entry.is_valid_at(i64::MAX);
    }
});
