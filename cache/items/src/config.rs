//! Configuration types for the item cache.

use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;

/// Fixed per-item header overhead counted in every item's total size.
pub const ITEM_HEADER_SIZE: usize = 48;

/// Maximum key length in bytes.
pub const MAX_KEY_LEN: usize = 250;

/// Absolute cap on an item's payload length (value plus terminator).
pub const MAX_PAYLOAD_LEN: usize = 1024 * 1024;

/// Items are only repositioned in their LRU if they have not been
/// repositioned in this many seconds.
pub const UPDATE_INTERVAL: u32 = 60;

/// Output budget for a single class dump (2MB).
pub const DUMP_BUDGET: usize = 2 * 1024 * 1024;

/// Default memory limit (64MB).
pub const DEFAULT_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

/// Default page size (1MB). Also the size of the largest class.
pub const DEFAULT_PAGE_SIZE: usize = 1024 * 1024;

/// Default minimum payload room in the smallest class.
pub const DEFAULT_CHUNK_SIZE: usize = 48;

/// Default growth factor between adjacent classes.
pub const DEFAULT_GROWTH_FACTOR: f64 = 1.25;

/// Default number of LRU tail candidates examined per eviction.
pub const DEFAULT_EVICTION_SCAN_DEPTH: usize = 50;

/// Item cache configuration.
///
/// Can be built in code (usually through [`ItemCacheBuilder`]) or loaded
/// from a TOML file:
///
/// ```toml
/// memory_limit = 67108864
/// page_size = 1048576
/// growth_factor = 1.25
/// evict_to_free = true
/// eviction_scan_depth = 50
/// ```
///
/// [`ItemCacheBuilder`]: crate::ItemCacheBuilder
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ItemCacheConfig {
    /// Total bytes the slab pool may carve into pages.
    pub memory_limit: usize,
    /// Page size in bytes. Pages are assigned to one class at a time.
    pub page_size: usize,
    /// Minimum payload room in the smallest class (excluding the header).
    pub chunk_size: usize,
    /// Chunk size ratio between adjacent classes. Must be > 1.0.
    pub growth_factor: f64,
    /// Evict unreferenced items when an allocation fails.
    pub evict_to_free: bool,
    /// How many items to examine from a class's LRU tail when looking
    /// for an eviction victim.
    pub eviction_scan_depth: usize,
}

impl Default for ItemCacheConfig {
    fn default() -> Self {
        Self {
            memory_limit: DEFAULT_MEMORY_LIMIT,
            page_size: DEFAULT_PAGE_SIZE,
            chunk_size: DEFAULT_CHUNK_SIZE,
            growth_factor: DEFAULT_GROWTH_FACTOR,
            evict_to_free: true,
            eviction_scan_depth: DEFAULT_EVICTION_SCAN_DEPTH,
        }
    }
}

impl ItemCacheConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.growth_factor <= 1.0 || !self.growth_factor.is_finite() {
            return Err(ConfigError::Invalid(format!(
                "growth_factor ({}) must be > 1.0",
                self.growth_factor
            )));
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::Invalid("chunk_size must be > 0".into()));
        }
        if self.page_size < ITEM_HEADER_SIZE + self.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "page_size ({}) must hold at least one smallest-class chunk ({})",
                self.page_size,
                ITEM_HEADER_SIZE + self.chunk_size
            )));
        }
        if self.memory_limit < self.page_size {
            return Err(ConfigError::Invalid(format!(
                "memory_limit ({}) must be at least page_size ({})",
                self.memory_limit, self.page_size
            )));
        }
        if self.eviction_scan_depth == 0 {
            return Err(ConfigError::Invalid(
                "eviction_scan_depth must be > 0 (use evict_to_free = false to disable eviction)"
                    .into(),
            ));
        }
        Ok(())
    }

    /// Number of pages the memory limit allows.
    pub fn page_count(&self) -> usize {
        self.memory_limit / self.page_size
    }
}
