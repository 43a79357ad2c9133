//! Strong tier: bounded LRU cache for decoded buffers
//!
//! The primary cache. Owns entries up to a byte budget and, on eviction,
//! hands each buffer to exactly one of the pooling allocator (via the
//! reference counter) or the weak tier. All operations are internally
//! synchronized behind a single coarse lock.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::buffer::{CacheKey, CacheValue, ImageBuffer};
use crate::counter::ReferenceCounter;
use crate::weak::WeakCache;

/// Memory pressure level reported by the host environment
///
/// Ordinal: each level implies everything below it. [`trim_memory`] compares
/// against `Low` and `Background`.
///
/// [`trim_memory`]: BoundedMemoryCache::trim_memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TrimLevel {
    /// Memory is comfortable; no trimming required
    Nominal,
    /// The host is running low on memory; shed what can be cheaply rebuilt
    Low,
    /// The process is backgrounded or memory is severely short; drop everything
    Background,
    /// The process risks termination unless memory is freed immediately
    Critical,
}

/// Statistics about strong tier usage
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries currently resident
    pub entry_count: usize,

    /// Total bytes across resident entries
    pub size: usize,

    /// Configured byte budget
    pub max_size: usize,

    /// Number of local cache hits
    pub hits: u64,

    /// Number of local cache misses
    pub misses: u64,

    /// Number of entries removed from residency
    pub evictions: u64,

    /// Evicted buffers reclaimed by the pooling allocator
    pub pooled: u64,

    /// Evicted buffers migrated to the weak tier
    pub migrated: u64,
}

impl CacheStats {
    /// Calculate the local hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Calculate budget utilization (0.0 to 1.0)
    pub fn utilization(&self) -> f64 {
        if self.max_size == 0 {
            0.0
        } else {
            self.size as f64 / self.max_size as f64
        }
    }
}

/// A resident entry. `size` is computed once at insertion and immutable.
struct Entry {
    buffer: Arc<ImageBuffer>,
    is_sampled: bool,
    size: usize,
}

/// Internal tier state
struct TierState {
    /// Map from cache key to resident entry
    entries: HashMap<CacheKey, Entry>,

    /// Recency order, least recently stored at the front
    ///
    /// Contains exactly the keys of `entries`, no duplicates. Lookups do not
    /// reorder it; only `set` refreshes a key's position.
    recency: VecDeque<CacheKey>,

    /// Current bytes across resident entries
    size_used: usize,

    /// Statistics
    stats: CacheStats,
}

impl TierState {
    /// Detach an entry from the map, queue and size accounting
    fn detach(&mut self, key: &str) -> Option<Entry> {
        let entry = self.entries.remove(key)?;
        self.recency.retain(|k| k != key);
        self.size_used = self.size_used.saturating_sub(entry.size);
        Some(entry)
    }

    /// Refresh the stats snapshot after a mutation
    fn sync_stats(&mut self) {
        self.stats.entry_count = self.entries.len();
        self.stats.size = self.size_used;
    }
}

/// Bounded LRU cache over decoded image buffers
///
/// Capacity is accounted in bytes, computed per buffer at insertion time.
/// Inserting over budget evicts least-recently-stored entries until the
/// budget holds again; every removal runs the eviction rule, which
/// decrements the buffer's reference count and migrates the buffer to the
/// weak tier unless the pooling allocator reclaimed it.
///
/// Lookups are side-effect free: a `get` neither evicts nor refreshes
/// recency, and a local miss falls through to the weak tier without
/// promoting its result.
pub struct BoundedMemoryCache {
    /// Configured byte budget, fixed at construction
    max_size: usize,

    counter: Arc<dyn ReferenceCounter>,
    weak: Arc<dyn WeakCache>,
    state: Mutex<TierState>,
}

impl BoundedMemoryCache {
    /// Create a bounded cache with the given byte budget
    ///
    /// `max_size` must be greater than zero; a zero budget is expressed by
    /// the weak-only or disabled strategies instead.
    pub fn new(
        weak: Arc<dyn WeakCache>,
        counter: Arc<dyn ReferenceCounter>,
        max_size: usize,
    ) -> Self {
        debug_assert!(max_size > 0, "bounded cache requires a non-zero budget");
        Self {
            max_size,
            counter,
            weak,
            state: Mutex::new(TierState {
                entries: HashMap::new(),
                recency: VecDeque::new(),
                size_used: 0,
                stats: CacheStats {
                    max_size,
                    ..Default::default()
                },
            }),
        }
    }

    /// Look up a value by key
    ///
    /// On a local miss, falls through to the weak tier. A weak hit is not
    /// promoted back into this tier.
    pub fn get(&self, key: &str) -> Option<CacheValue> {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(entry) = state.entries.get(key) {
                let value = CacheValue {
                    buffer: Arc::clone(&entry.buffer),
                    is_sampled: entry.is_sampled,
                };
                state.stats.hits += 1;
                return Some(value);
            }
            state.stats.misses += 1;
        }
        self.weak.get(key)
    }

    /// Store a buffer under a key
    ///
    /// Replaces any prior entry at the key (the replaced entry is evicted
    /// exactly like a capacity eviction). If the buffer's byte size exceeds
    /// the budget it bypasses this tier entirely: the structure's
    /// bookkeeping does not admit over-budget entries without evicting
    /// everything, so the buffer is routed to the weak tier instead of
    /// triggering a mass eviction.
    pub fn set(&self, key: CacheKey, buffer: Arc<ImageBuffer>, is_sampled: bool) {
        let size = buffer.byte_size();
        let mut state = self.state.lock().unwrap();

        if size > self.max_size {
            log::debug!(
                "{}: buffer ({} bytes) exceeds budget ({} bytes), bypassing strong tier",
                key,
                size,
                self.max_size
            );
            match state.detach(&key) {
                Some(previous) => {
                    // The standard eviction path already routes the previous
                    // buffer; the new one is intentionally not stored over it.
                    self.run_eviction_rule(&mut state, key, previous);
                }
                None => self.weak.set(key, buffer, is_sampled, size),
            }
            state.sync_stats();
            return;
        }

        self.counter.increment(&buffer);
        if let Some(previous) = state.detach(&key) {
            self.run_eviction_rule(&mut state, key.clone(), previous);
        }
        state.size_used += size;
        state.recency.push_back(key.clone());
        state.entries.insert(
            key,
            Entry {
                buffer,
                is_sampled,
                size,
            },
        );

        self.trim_locked(&mut state, self.max_size);
        state.sync_stats();
    }

    /// Get the current sum of resident entries' byte sizes
    pub fn size(&self) -> usize {
        self.state.lock().unwrap().size_used
    }

    /// Get the configured byte budget
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Get the number of resident entries
    pub fn entry_count(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    /// Get a statistics snapshot
    pub fn stats(&self) -> CacheStats {
        self.state.lock().unwrap().stats
    }

    /// Remove the resident entry at `key`, if present
    ///
    /// Runs the eviction rule for the removed entry. Any copy the weak tier
    /// holds under this key is left untouched.
    pub fn invalidate(&self, key: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(entry) = state.detach(key) {
            log::debug!("invalidated {}", key);
            self.run_eviction_rule(&mut state, key.to_string(), entry);
            state.sync_stats();
        }
    }

    /// Evict every resident entry
    ///
    /// Equivalent to trimming to zero capacity; the eviction rule runs for
    /// each entry, oldest first.
    pub fn clear_memory(&self) {
        let mut state = self.state.lock().unwrap();
        log::debug!("clearing {} entries", state.entries.len());
        self.trim_locked(&mut state, 0);
        state.sync_stats();
    }

    /// Respond to a host memory-pressure signal
    ///
    /// `Background` and above clears the tier; `Low` trims resident size to
    /// half its value at the time of the call; anything below is a no-op.
    /// Full clearing is reserved for severe pressure where the process risks
    /// termination; the half-trim keeps the most recently stored half.
    pub fn trim_memory(&self, level: TrimLevel) {
        let mut state = self.state.lock().unwrap();
        if level >= TrimLevel::Background {
            log::debug!("trim_memory({:?}): clearing", level);
            self.trim_locked(&mut state, 0);
        } else if level >= TrimLevel::Low {
            let target = state.size_used / 2;
            log::debug!("trim_memory({:?}): trimming to {} bytes", level, target);
            self.trim_locked(&mut state, target);
        }
        state.sync_stats();
    }

    /// Evict least-recently-stored entries until `size_used <= target`
    fn trim_locked(&self, state: &mut TierState, target: usize) {
        while state.size_used > target {
            let key = match state.recency.pop_front() {
                Some(key) => key,
                None => break,
            };
            // The queue mirrors the map exactly, so the entry must exist.
            if let Some(entry) = state.entries.remove(&key) {
                state.size_used = state.size_used.saturating_sub(entry.size);
                self.run_eviction_rule(state, key, entry);
            }
        }
    }

    /// The eviction rule: decrement first, migrate only on pool rejection
    ///
    /// Runs once per entry removed from residency. The ordering guarantees a
    /// buffer is never simultaneously pool-eligible and weak-tier-resident:
    /// ownership transfers to exactly one of the two.
    fn run_eviction_rule(&self, state: &mut TierState, key: CacheKey, entry: Entry) {
        state.stats.evictions += 1;
        if self.counter.decrement(&entry.buffer) {
            state.stats.pooled += 1;
            log::trace!("evicted {}: buffer reclaimed by pool", key);
        } else {
            state.stats.migrated += 1;
            log::trace!("evicted {}: migrated to weak tier", key);
            self.weak.set(key, entry.buffer, entry.is_sampled, entry.size);
        }
    }
}
