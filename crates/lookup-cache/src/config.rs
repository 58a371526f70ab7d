//! Cache configuration options

use serde::{Deserialize, Serialize};

/// Configuration for a lookup cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether lookups are cached at all
    pub enabled: bool,
    /// Number of entries above which eviction kicks in (0 = unbounded)
    pub max_size: usize,
    /// Load the whole table into the cache when the step starts
    pub load_all: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_size: 0,
            load_all: false,
        }
    }
}

impl CacheConfig {
    /// Create an enabled cache configuration with the given size bound
    pub fn new(max_size: usize) -> Self {
        Self {
            enabled: true,
            max_size,
            load_all: false,
        }
    }

    /// Create a disabled cache configuration
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Set the maximum size
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    /// Enable or disable loading the whole table at startup
    pub fn with_load_all(mut self, load_all: bool) -> Self {
        self.load_all = load_all;
        self
    }

    /// Enable or disable the cache
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether the size bound applies
    pub fn is_bounded(&self) -> bool {
        self.max_size > 0
    }
}
