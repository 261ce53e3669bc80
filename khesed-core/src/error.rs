//! Error types for Khesed cache operations

use thiserror::Error;

/// Errors raised by the cache itself.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache key must not be empty")]
    EmptyKey,

    #[error("Invalid TTL of {ttl_secs}s: TTL must be greater than zero")]
    InvalidTtl { ttl_secs: u64 },

    #[error("Serialization failed for key {key}: {reason}")]
    Serialization { key: String, reason: String },
}

/// Secondary store (mirror) errors.
///
/// These never escape a cache operation; the cache logs them and treats the
/// mirror as unavailable for that call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MirrorError {
    #[error("Mirror store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Mirror I/O error: {reason}")]
    Io { reason: String },

    #[error("Mirror transaction failed: {reason}")]
    Transaction { reason: String },

    #[error("Malformed mirror record under {key}: {reason}")]
    Malformed { key: String, reason: String },

    #[error("Mirror quota exceeded: {used} of {limit} bytes")]
    QuotaExceeded { used: usize, limit: usize },
}

impl From<std::io::Error> for MirrorError {
    fn from(e: std::io::Error) -> Self {
        MirrorError::Io {
            reason: e.to_string(),
        }
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Khesed errors.
#[derive(Debug, Clone, Error)]
pub enum KhesedError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Mirror error: {0}")]
    Mirror(#[from] MirrorError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Khesed operations.
pub type KhesedResult<T> = Result<T, KhesedError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_error_display_invalid_ttl() {
        let err = CacheError::InvalidTtl { ttl_secs: 0 };
        let msg = format!("{}", err);
        assert!(msg.contains("Invalid TTL"));
        assert!(msg.contains("0s"));
    }

    #[test]
    fn test_mirror_error_display_quota() {
        let err = MirrorError::QuotaExceeded {
            used: 6000,
            limit: 5000,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("quota exceeded"));
        assert!(msg.contains("6000"));
        assert!(msg.contains("5000"));
    }

    #[test]
    fn test_mirror_error_from_io() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume");
        let err: MirrorError = io.into();
        assert!(matches!(err, MirrorError::Io { ref reason } if reason.contains("read-only")));
    }

    #[test]
    fn test_config_error_display_invalid_value() {
        let err = ConfigError::InvalidValue {
            field: "max_entries".to_string(),
            value: "0".to_string(),
            reason: "must be positive".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("max_entries"));
        assert!(msg.contains("must be positive"));
    }

    #[test]
    fn test_master_error_wraps_variants() {
        let err: KhesedError = CacheError::EmptyKey.into();
        assert!(matches!(err, KhesedError::Cache(CacheError::EmptyKey)));
        assert!(format!("{}", err).starts_with("Cache error"));

        let err: KhesedError = MirrorError::Unavailable {
            reason: "closed".to_string(),
        }
        .into();
        assert!(matches!(err, KhesedError::Mirror(_)));
    }
}
