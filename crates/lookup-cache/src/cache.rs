//! Bounded lookup cache with sampled timestamp eviction

use crate::config::CacheConfig;
use crate::key::RowKey;
use crate::stats::CacheStats;
use indexmap::IndexMap;
use lookup_core::Value;
use std::sync::Arc;
use tracing::debug;

/// Share of the cache sampled when an eviction pass runs (one in ten).
const EVICTION_SAMPLE_DIVISOR: usize = 10;

/// Entry stored in the cache
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Resolved return values, one per configured return field
    values: Vec<Value>,
    /// Logical insertion time, strictly increasing within one cache
    stamp: u64,
}

impl CacheEntry {
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn stamp(&self) -> u64 {
        self.stamp
    }
}

/// Single-owner key → values store used by one lookup step instance.
///
/// This is not an LRU cache. Every insert is stamped with a logical clock
/// and, once the entry count exceeds `max_size`, one pass of sampled
/// eviction runs:
///
/// 1. every `len / 10`-th entry (at least every entry) is sampled in
///    insertion order,
/// 2. the samples' stamps are sorted,
/// 3. every entry stamped strictly before the second-smallest sample is
///    removed.
///
/// A pass typically removes a little over 10% of the entries, oldest first,
/// but the resulting size is not guaranteed to be `<= max_size`. Hits do not
/// refresh stamps. After [`mark_bulk_loaded`](Self::mark_bulk_loaded) no
/// eviction ever runs.
///
/// The cache is not synchronized; it belongs to exactly one step.
pub struct LookupCache {
    entries: IndexMap<RowKey, CacheEntry, ahash::RandomState>,
    config: CacheConfig,
    clock: u64,
    bulk_loaded: bool,
    stats: Arc<CacheStats>,
}

impl LookupCache {
    /// Create an empty cache with the given configuration
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: IndexMap::with_hasher(ahash::RandomState::new()),
            config,
            clock: 0,
            bulk_loaded: false,
            stats: Arc::new(CacheStats::new()),
        }
    }

    /// Exact-match lookup
    pub fn get(&self, key: &RowKey) -> Option<&[Value]> {
        match self.entries.get(key) {
            Some(entry) => {
                self.stats.record_hit();
                Some(entry.values())
            }
            None => {
                self.stats.record_miss();
                None
            }
        }
    }

    /// Return the first entry, in insertion order, whose key satisfies
    /// `predicate`.
    pub fn scan<F>(&self, mut predicate: F) -> Option<(&RowKey, &[Value])>
    where
        F: FnMut(&RowKey) -> bool,
    {
        let found = self
            .entries
            .iter()
            .find(|(key, _)| predicate(key))
            .map(|(key, entry)| (key, entry.values()));

        if found.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }
        found
    }

    /// Insert or overwrite an entry, then run an eviction pass if the cache
    /// is over its bound. Returns the number of evicted entries.
    pub fn put(&mut self, key: RowKey, values: Vec<Value>) -> usize {
        self.clock += 1;
        let entry = CacheEntry {
            values,
            stamp: self.clock,
        };
        self.entries.insert(key, entry);
        self.stats.record_insert();

        let evicted = if self.needs_eviction() {
            self.evict_sampled()
        } else {
            0
        };

        self.stats.set_entry_count(self.entries.len() as u64);
        evicted
    }

    /// Declare the cache as holding the entire table. Disables eviction for
    /// the rest of the cache's life.
    pub fn mark_bulk_loaded(&mut self) {
        self.bulk_loaded = true;
    }

    pub fn is_bulk_loaded(&self) -> bool {
        self.bulk_loaded
    }

    fn needs_eviction(&self) -> bool {
        !self.bulk_loaded && self.config.is_bounded() && self.entries.len() > self.config.max_size
    }

    fn evict_sampled(&mut self) -> usize {
        let before = self.entries.len();
        let stride = (before / EVICTION_SAMPLE_DIVISOR).max(1);

        let mut samples: Vec<u64> = self
            .entries
            .values()
            .step_by(stride)
            .map(CacheEntry::stamp)
            .collect();
        samples.sort_unstable();

        if samples.len() < 2 {
            self.stats.record_eviction_run(0);
            return 0;
        }
        let threshold = samples[1];

        self.entries.retain(|_, entry| entry.stamp >= threshold);
        let removed = before - self.entries.len();

        debug!(
            removed,
            remaining = self.entries.len(),
            threshold,
            "Evicted lookup cache entries"
        );
        self.stats.record_eviction_run(removed as u64);
        removed
    }

    /// Check whether a key is cached without touching statistics
    pub fn contains_key(&self, key: &RowKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Stamp of a cached key, if present
    pub fn stamp_of(&self, key: &RowKey) -> Option<u64> {
        self.entries.get(key).map(CacheEntry::stamp)
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&RowKey, &CacheEntry)> {
        self.entries.iter()
    }

    /// Drop every entry and release the memory they held
    pub fn clear(&mut self) {
        self.entries = IndexMap::with_hasher(ahash::RandomState::new());
        self.stats.set_entry_count(0);
    }

    /// Get cache statistics
    pub fn stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Get current number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if cache is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the cache configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl std::fmt::Debug for LookupCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LookupCache")
            .field("max_size", &self.config.max_size)
            .field("bulk_loaded", &self.bulk_loaded)
            .field("current_entries", &self.len())
            .field("clock", &self.clock)
            .finish()
    }
}
