//! Error types for item cache operations.

/// Errors returned by the allocation and lifecycle operations.
///
/// Broken internal invariants (unlinking an item that is not in its bucket,
/// releasing an item nobody holds) are not represented here. Those are
/// programming errors and panic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The entry is larger than every size class. Retrying will not help.
    #[error("entry too large for any size class")]
    OversizedEntry,

    /// The allocator is exhausted and eviction found no unpinned victim
    /// within the scan bound.
    #[error("out of memory")]
    OutOfMemory,

    /// The key is too long (max 250 bytes).
    #[error("key too long (max 250 bytes)")]
    KeyTooLong,

    /// The payload length does not leave room for the `\r\n` terminator.
    #[error("payload shorter than its terminator")]
    PayloadTooShort,
}

/// Result type for item cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Errors from loading or validating an [`ItemCacheConfig`].
///
/// [`ItemCacheConfig`]: crate::ItemCacheConfig
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(String),
    /// The file is not valid TOML for this configuration.
    #[error("failed to parse config: {0}")]
    Parse(String),
    /// A value is out of range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            format!("{}", CacheError::OversizedEntry),
            "entry too large for any size class"
        );
        assert_eq!(format!("{}", CacheError::OutOfMemory), "out of memory");
        assert_eq!(
            format!("{}", CacheError::KeyTooLong),
            "key too long (max 250 bytes)"
        );
        assert_eq!(
            format!("{}", CacheError::PayloadTooShort),
            "payload shorter than its terminator"
        );
    }

    #[test]
    fn test_error_is_error_trait() {
        fn assert_error<E: std::error::Error>() {}
        assert_error::<CacheError>();
        assert_error::<ConfigError>();
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::Invalid("growth_factor must be > 1.0".into());
        assert_eq!(
            err.to_string(),
            "invalid config: growth_factor must be > 1.0"
        );
    }

    #[test]
    fn test_cache_result_err() {
        let result: CacheResult<i32> = Err(CacheError::OutOfMemory);
        assert!(matches!(result, Err(CacheError::OutOfMemory)));
    }
}
