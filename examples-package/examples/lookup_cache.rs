//! Lookup Cache Example
//!
//! Demonstrates sampled eviction, bulk loading and cache statistics.

use anyhow::Result;
use lookup_cache::{CacheConfig, LookupCache, RowKey};
use lookup_core::Value;

fn main() -> Result<()> {
    println!("=== Lookup Cache Example ===\n");

    // Example 1: Basic put/get
    basic_caching();

    // Example 2: Eviction when the cache outgrows max_size
    sampled_eviction();

    // Example 3: Bulk-loaded caches never evict
    bulk_loaded();

    println!("\n=== All cache examples completed! ===");
    Ok(())
}

fn key(id: i64) -> RowKey {
    RowKey::new(vec![Value::Int64(id)])
}

/// Example 1: Basic put/get operations
fn basic_caching() {
    println!("--- Example 1: Basic Caching ---\n");

    let mut cache = LookupCache::new(CacheConfig::new(10));
    cache.put(key(1), vec![Value::from("Alice")]);

    match cache.get(&key(1)) {
        Some(values) => println!("Cache HIT for {}: {}", key(1), values[0]),
        None => println!("Cache MISS"),
    }
    if cache.get(&key(2)).is_none() {
        println!("Expected MISS for {}", key(2));
    }
    println!();
}

/// Example 2: Sampled eviction
fn sampled_eviction() {
    println!("--- Example 2: Sampled Eviction ---\n");

    let mut cache = LookupCache::new(CacheConfig::new(100));
    for id in 0..100 {
        cache.put(key(id), vec![Value::Int64(id * 10)]);
    }
    println!("Cache at capacity: {} entries", cache.len());

    let evicted = cache.put(key(100), vec![Value::Int64(1000)]);
    println!("One more insert evicted {} entries", evicted);
    println!("Entries left: {}", cache.len());
    println!(
        "Oldest key still cached: {}",
        cache.contains_key(&key(0))
    );
    println!();
}

/// Example 3: Bulk-loaded caches and statistics
fn bulk_loaded() {
    println!("--- Example 3: Bulk Loaded ---\n");

    let mut cache = LookupCache::new(CacheConfig::new(10).with_load_all(true));
    cache.mark_bulk_loaded();
    for id in 0..50 {
        cache.put(key(id), vec![Value::Int64(id)]);
    }
    for id in 40..60 {
        cache.get(&key(id));
    }

    let stats = cache.stats();
    println!("Entries:    {}", cache.len());
    println!("Hits:       {}", stats.hits());
    println!("Misses:     {}", stats.misses());
    println!("Hit rate:   {:.1}%", stats.hit_rate() * 100.0);
    println!("Evictions:  {}", stats.evictions());
}
