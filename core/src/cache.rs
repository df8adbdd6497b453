//! C9 — Cache<K, V>: a bounded, thread-safe cache with pluggable
//! eviction and hit/miss/unused-entry accounting (spec.md §4.9).
//!
//! The teacher has no equivalent (it never re-reads a block twice), so
//! this is grounded directly on spec.md's description plus the general
//! shape of `BlockMap`/`WindowMap` above it in this file: a
//! `Mutex`-guarded inner struct with simple counters, matching this
//! crate's existing style rather than reaching for an external LRU
//! crate, since the eviction *policy* itself needs to be pluggable
//! (`EvictionPolicy` below) to satisfy spec.md's "pluggable eviction
//! policy abstraction" requirement.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;

/// Decides which key to evict when a bounded `Cache` is full and a new
/// key needs room. Implementations see only each key's logical "last
/// touched" tick, not the cached value.
pub trait EvictionPolicy<K>: Send {
    /// Called after every successful `get`/`insert` touching `key`.
    fn on_touch(&mut self, key: &K, tick: u64);
    /// Called when a key is removed (evicted or explicitly dropped).
    fn on_remove(&mut self, key: &K);
    /// Choose a key to evict. Must return a key currently tracked via
    /// `on_touch` and not yet `on_remove`d.
    fn evict(&mut self) -> Option<K>;
}

/// Least-recently-used eviction: evicts whichever tracked key has the
/// smallest touch tick.
#[derive(Default)]
pub struct Lru<K> {
    touched: HashMap<K, u64>,
}

impl<K: Eq + Hash + Clone> EvictionPolicy<K> for Lru<K> {
    fn on_touch(&mut self, key: &K, tick: u64) {
        self.touched.insert(key.clone(), tick);
    }

    fn on_remove(&mut self, key: &K) {
        self.touched.remove(key);
    }

    fn evict(&mut self) -> Option<K> {
        self.touched
            .iter()
            .min_by_key(|(_, &tick)| tick)
            .map(|(k, _)| k.clone())
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Entries evicted while never having been `get`-hit after insertion
    /// — capacity spent on a prefetch nobody ended up reading.
    pub unused_evictions: u64,
}

struct Entry<V> {
    value: V,
    ever_hit: bool,
}

struct Inner<K, V> {
    capacity: usize,
    entries: HashMap<K, Entry<V>>,
    tick: u64,
    stats: CacheStats,
}

pub struct Cache<K, V> {
    inner: Mutex<Inner<K, V>>,
    policy: Mutex<Box<dyn EvictionPolicy<K>>>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone + Send + 'static,
    V: Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self::with_policy(capacity, Box::new(Lru::default()))
    }

    pub fn with_policy(capacity: usize, policy: Box<dyn EvictionPolicy<K>>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                capacity,
                entries: HashMap::new(),
                tick: 0,
                stats: CacheStats::default(),
            }),
            policy: Mutex::new(policy),
        }
    }

    pub fn get(&self, key: &K) -> Option<V> {
        let mut guard = self.inner.lock().unwrap();
        guard.tick += 1;
        let tick = guard.tick;
        if let Some(entry) = guard.entries.get_mut(key) {
            entry.ever_hit = true;
            let value = entry.value.clone();
            guard.stats.hits += 1;
            self.policy.lock().unwrap().on_touch(key, tick);
            Some(value)
        } else {
            guard.stats.misses += 1;
            None
        }
    }

    /// Inserts `value` under `key`, evicting per policy if at capacity.
    /// Capacity 0 accepts the call but stores nothing, so `get` always
    /// misses (spec.md's explicit zero-capacity behavior).
    pub fn insert(&self, key: K, value: V) {
        let mut guard = self.inner.lock().unwrap();
        if guard.capacity == 0 {
            return;
        }
        guard.tick += 1;
        let tick = guard.tick;

        if !guard.entries.contains_key(&key) && guard.entries.len() >= guard.capacity {
            let evicted = self.policy.lock().unwrap().evict();
            if let Some(evict_key) = evicted {
                if let Some(entry) = guard.entries.remove(&evict_key) {
                    if !entry.ever_hit {
                        guard.stats.unused_evictions += 1;
                    }
                }
                self.policy.lock().unwrap().on_remove(&evict_key);
            }
        }

        guard.entries.insert(
            key.clone(),
            Entry {
                value,
                ever_hit: false,
            },
        );
        self.policy.lock().unwrap().on_touch(&key, tick);
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().unwrap().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.inner.lock().unwrap().stats
    }

    /// Drops every entry without touching the running hit/miss/eviction
    /// counters — those describe this cache's whole lifetime, not just
    /// the entries currently resident.
    pub fn clear(&self) {
        let mut guard = self.inner.lock().unwrap();
        let keys: Vec<K> = guard.entries.keys().cloned().collect();
        guard.entries.clear();
        let mut policy = self.policy.lock().unwrap();
        for key in &keys {
            policy.on_remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_insert_and_hit() {
        let c: Cache<u32, &str> = Cache::new(2);
        c.insert(1, "a");
        assert_eq!(c.get(&1), Some("a"));
        let stats = c.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn miss_on_absent_key() {
        let c: Cache<u32, &str> = Cache::new(2);
        assert_eq!(c.get(&1), None);
        assert_eq!(c.stats().misses, 1);
    }

    #[test]
    fn lru_evicts_least_recently_touched() {
        let c: Cache<u32, u32> = Cache::new(2);
        c.insert(1, 10);
        c.insert(2, 20);
        // touch 1 so 2 becomes the least-recently-used
        assert_eq!(c.get(&1), Some(10));
        c.insert(3, 30);
        assert!(!c.contains(&2));
        assert!(c.contains(&1));
        assert!(c.contains(&3));
    }

    #[test]
    fn zero_capacity_stores_nothing() {
        let c: Cache<u32, u32> = Cache::new(0);
        c.insert(1, 10);
        assert_eq!(c.get(&1), None);
        assert!(c.is_empty());
    }

    #[test]
    fn eviction_of_never_hit_entry_counts_as_unused() {
        let c: Cache<u32, u32> = Cache::new(1);
        c.insert(1, 10);
        c.insert(2, 20); // evicts 1, which was never `get`-hit
        assert_eq!(c.stats().unused_evictions, 1);
    }
}
