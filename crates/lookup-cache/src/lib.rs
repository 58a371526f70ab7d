//! Row-key cache for database lookups
//!
//! This crate provides the cache a lookup step consults before querying the
//! database for a key.
//!
//! # Features
//!
//! - **Composite keys**: [`RowKey`] holds one coerced value per key column
//! - **Sampled eviction**: inserts above `max_size` drop entries older than a
//!   sampled threshold instead of maintaining an exact LRU order
//! - **Bulk loading**: a cache flagged as holding the whole table never evicts
//! - **Statistics**: hits, misses, inserts and evictions
//!
//! # Example
//!
//! ```ignore
//! use lookup_cache::{CacheConfig, LookupCache, RowKey};
//!
//! let mut cache = LookupCache::new(CacheConfig::new(1000));
//!
//! let key = RowKey::new(vec![Value::Int64(1)]);
//! if let Some(values) = cache.get(&key) {
//!     return Ok(values.to_vec());
//! }
//!
//! let values = database_lookup(&key)?;
//! cache.put(key, values.clone());
//! ```

pub mod cache;
pub mod config;
pub mod key;
pub mod stats;

pub use cache::{CacheEntry, LookupCache};
pub use config::CacheConfig;
pub use key::RowKey;
pub use stats::CacheStats;
