//! Value caching for evaluation.
//!
//! Entries are keyed by node index and revision. Any edit that can change a
//! node's value gives it a new revision, so a stale entry is never hit; it
//! simply ages out of the LRU.

use crate::core::error::NodeIndex;
use crate::core::types::Value;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default number of entries.
pub const DEFAULT_CAPACITY: usize = 256;

/// A cache key: a node position and the revision it was evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// The node index.
    pub index: NodeIndex,
    /// The node revision the value belongs to.
    pub revision: u64,
}

impl CacheKey {
    /// Create a new cache key.
    pub fn new(index: NodeIndex, revision: u64) -> Self {
        Self { index, revision }
    }
}

/// Cached entry with metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// The cached value.
    pub value: Value,
    /// When the entry was created.
    pub created_at: Instant,
    /// How long the original computation took.
    pub computation_time: Duration,
    /// Approximate memory size in bytes.
    pub memory_size: usize,
}

impl CacheEntry {
    /// Create a new cache entry.
    pub fn new(value: Value, computation_time: Duration) -> Self {
        let memory_size = estimate_value_size(&value);
        Self {
            value,
            created_at: Instant::now(),
            computation_time,
            memory_size,
        }
    }
}

/// Estimate memory size of a single value.
fn estimate_value_size(value: &Value) -> usize {
    let base = std::mem::size_of::<Value>();
    match value {
        Value::String(s) | Value::Error(s) => base + s.len(),
        Value::Array(items) => base + items.iter().map(estimate_value_size).sum::<usize>(),
        // Pixels stay in the image engine; only the handle is held here.
        _ => base,
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries evicted.
    pub evictions: u64,
    /// Total time saved by cache hits.
    pub time_saved: Duration,
}

impl CacheStats {
    /// Calculate hit ratio.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Thread-safe value cache.
pub struct ValueCache {
    /// The LRU cache.
    cache: Mutex<LruCache<CacheKey, CacheEntry>>,
    /// Maximum memory usage in bytes.
    max_memory: usize,
    /// Current memory usage.
    current_memory: Mutex<usize>,
    /// Cache statistics.
    stats: Mutex<CacheStats>,
}

impl ValueCache {
    /// Create a new cache with the given capacity (entries).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
            max_memory: 64 * 1024 * 1024, // 64 MB default
            current_memory: Mutex::new(0),
            stats: Mutex::new(CacheStats::default()),
        }
    }

    /// Create a cache with custom memory limit.
    pub fn with_memory_limit(capacity: usize, max_memory_mb: usize) -> Self {
        let mut cache = Self::new(capacity);
        cache.max_memory = max_memory_mb * 1024 * 1024;
        cache
    }

    /// Get a cached value, counting the hit or miss.
    pub fn get(&self, key: &CacheKey) -> Option<Value> {
        let mut cache = self.cache.lock();
        let mut stats = self.stats.lock();
        match cache.get(key) {
            Some(entry) => {
                stats.hits += 1;
                stats.time_saved += entry.computation_time;
                log::debug!("Cache hit for node {} at revision {}", key.index, key.revision);
                Some(entry.value.clone())
            }
            None => {
                stats.misses += 1;
                None
            }
        }
    }

    /// Get a cached value without touching statistics or recency.
    pub fn peek(&self, key: &CacheKey) -> Option<Value> {
        self.cache.lock().peek(key).map(|entry| entry.value.clone())
    }

    /// Check if a value is cached under `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.cache.lock().contains(key)
    }

    /// Store a value in the cache.
    pub fn put(&self, key: CacheKey, value: Value, computation_time: Duration) {
        let entry = CacheEntry::new(value, computation_time);
        let entry_size = entry.memory_size;
        let mut cache = self.cache.lock();
        let mut current = self.current_memory.lock();

        if let Some(previous) = cache.pop(&key) {
            *current = current.saturating_sub(previous.memory_size);
        }

        // Evict entries if needed to stay under memory limit
        while *current + entry_size > self.max_memory {
            match cache.pop_lru() {
                Some((_, evicted)) => {
                    *current = current.saturating_sub(evicted.memory_size);
                    self.stats.lock().evictions += 1;
                }
                None => break,
            }
        }

        // Capacity eviction.
        if let Some((evicted_key, evicted)) = cache.push(key, entry) {
            if evicted_key != key {
                *current = current.saturating_sub(evicted.memory_size);
                self.stats.lock().evictions += 1;
            }
        }
        *current += entry_size;
        log::debug!("Cached node {} at revision {}", key.index, key.revision);
    }

    /// Invalidate a specific entry.
    pub fn invalidate(&self, key: &CacheKey) {
        let mut cache = self.cache.lock();
        if let Some(entry) = cache.pop(key) {
            let mut current = self.current_memory.lock();
            *current = current.saturating_sub(entry.memory_size);
        }
    }

    /// Invalidate all entries for a node position.
    pub fn invalidate_node(&self, index: NodeIndex) {
        let mut cache = self.cache.lock();
        let keys_to_remove: Vec<CacheKey> = cache
            .iter()
            .filter(|(k, _)| k.index == index)
            .map(|(k, _)| *k)
            .collect();

        let mut total_freed = 0;
        for key in keys_to_remove {
            if let Some(entry) = cache.pop(&key) {
                total_freed += entry.memory_size;
            }
        }

        let mut current = self.current_memory.lock();
        *current = current.saturating_sub(total_freed);
    }

    /// Clear the entire cache.
    pub fn clear(&self) {
        let mut cache = self.cache.lock();
        cache.clear();
        *self.current_memory.lock() = 0;
    }

    /// Get cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats.lock().clone()
    }

    /// Get current memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        *self.current_memory.lock()
    }

    /// Get number of cached entries.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ValueCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// A shared cache wrapped in Arc.
pub type SharedCache = Arc<ValueCache>;

/// Create a new shared cache.
pub fn new_shared_cache(capacity: usize) -> SharedCache {
    Arc::new(ValueCache::new(capacity))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_put_get() {
        let cache = ValueCache::new(10);
        let key = CacheKey::new(2, 7);
        cache.put(key, Value::Number(5.0), Duration::from_millis(3));

        assert_eq!(cache.get(&key), Some(Value::Number(5.0)));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.time_saved, Duration::from_millis(3));
    }

    #[test]
    fn test_stale_revision_misses() {
        let cache = ValueCache::new(10);
        cache.put(CacheKey::new(2, 7), Value::Number(5.0), Duration::ZERO);

        assert!(cache.get(&CacheKey::new(2, 8)).is_none());
        assert_eq!(cache.stats().misses, 1);
        assert!(cache.peek(&CacheKey::new(2, 7)).is_some());
        assert_eq!(cache.stats().hits, 0);
    }

    #[test]
    fn test_capacity_eviction() {
        let cache = ValueCache::new(2);
        for revision in 0..3 {
            cache.put(CacheKey::new(0, revision), Value::Integer(revision as i64), Duration::ZERO);
        }
        assert_eq!(cache.len(), 2);
        assert!(!cache.contains(&CacheKey::new(0, 0)));
        assert_eq!(cache.stats().evictions, 1);
        assert_eq!(cache.memory_usage(), 2 * std::mem::size_of::<Value>());
    }

    #[test]
    fn test_memory_eviction() {
        let cache = ValueCache::with_memory_limit(10, 0);
        cache.put(CacheKey::new(0, 1), Value::string("x"), Duration::ZERO);
        cache.put(CacheKey::new(1, 2), Value::string("y"), Duration::ZERO);
        // Each entry exceeds the limit, so the previous one is pushed out.
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&CacheKey::new(1, 2)));
    }

    #[test]
    fn test_invalidate_node() {
        let cache = ValueCache::new(10);
        for revision in 0..5 {
            cache.put(CacheKey::new(1, revision), Value::Boolean(true), Duration::ZERO);
        }
        let other = CacheKey::new(2, 9);
        cache.put(other, Value::Boolean(false), Duration::ZERO);
        assert_eq!(cache.len(), 6);

        cache.invalidate_node(1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&other).is_some());

        cache.invalidate(&other);
        assert!(cache.is_empty());
        assert_eq!(cache.memory_usage(), 0);
    }
}
