//! Memory cache facade and strategy selection
//!
//! Picks one of three strategies at construction time based on the
//! configured budget and the weak tier implementation, and exposes the
//! unified cache contract over whichever strategy is active.

use std::sync::Arc;

use crate::buffer::{CacheKey, CacheValue, ImageBuffer};
use crate::config::CacheConfig;
use crate::counter::{BufferRefCounter, ReferenceCounter};
use crate::pool::{BufferPool, FreeListPool, NoopBufferPool};
use crate::strong::{BoundedMemoryCache, CacheStats, TrimLevel};
use crate::weak::{BoundedWeakCache, NoopWeakCache, WeakCache};

/// The memory cache exposed to callers
///
/// A closed set of strategies, selected exactly once at construction (see
/// [`MemoryCache::new`]); there is no runtime switching. Callers construct
/// one instance, wrap it in an `Arc` and inject it wherever decoded results
/// are produced or consumed — there is no ambient global instance.
pub enum MemoryCache {
    /// Caching disabled: every read misses, every write is dropped
    Disabled,

    /// No strong tier; reads and writes pass straight through the weak tier
    WeakOnly {
        /// The weak tier serving all traffic
        weak: Arc<dyn WeakCache>,
    },

    /// Full two-tier behavior with a byte-bounded strong tier
    Bounded(BoundedMemoryCache),
}

impl MemoryCache {
    /// Select a strategy from the collaborators and the configured budget
    ///
    /// - `max_size > 0`: the bounded strategy.
    /// - `max_size == 0` with a genuine (non-stub) weak tier: weak-only.
    /// - otherwise: disabled.
    pub fn new(
        weak: Arc<dyn WeakCache>,
        counter: Arc<dyn ReferenceCounter>,
        max_size: usize,
    ) -> Self {
        if max_size > 0 {
            log::debug!("memory cache: bounded strategy ({} bytes)", max_size);
            MemoryCache::Bounded(BoundedMemoryCache::new(weak, counter, max_size))
        } else if !weak.is_noop() {
            log::debug!("memory cache: weak-only strategy");
            MemoryCache::WeakOnly { weak }
        } else {
            log::debug!("memory cache: disabled");
            MemoryCache::Disabled
        }
    }

    /// Wire a full cache stack (pool, counter, weak tier) from one config
    pub fn from_config(config: &CacheConfig) -> Self {
        let pool: Arc<dyn BufferPool> = if config.pool_size > 0 {
            Arc::new(FreeListPool::new(config.pool_size))
        } else {
            Arc::new(NoopBufferPool)
        };
        let weak: Arc<dyn WeakCache> = if config.weak_cache_size > 0 {
            Arc::new(BoundedWeakCache::new(config.weak_cache_size))
        } else {
            Arc::new(NoopWeakCache)
        };
        let counter = Arc::new(BufferRefCounter::new(pool));
        Self::new(weak, counter, config.memory_cache_size)
    }

    /// Create a bounded cache with a budget in megabytes and the given
    /// collaborators
    pub fn bounded_mb(
        weak: Arc<dyn WeakCache>,
        counter: Arc<dyn ReferenceCounter>,
        megabytes: usize,
    ) -> Self {
        Self::new(weak, counter, megabytes * 1024 * 1024)
    }

    /// Look up a value by key
    pub fn get(&self, key: &str) -> Option<CacheValue> {
        match self {
            MemoryCache::Disabled => None,
            MemoryCache::WeakOnly { weak } => weak.get(key),
            MemoryCache::Bounded(cache) => cache.get(key),
        }
    }

    /// Store a buffer under a key; may evict
    pub fn set(&self, key: CacheKey, buffer: Arc<ImageBuffer>, is_sampled: bool) {
        match self {
            MemoryCache::Disabled => {}
            MemoryCache::WeakOnly { weak } => {
                // No strong tier has pre-tracked the size; compute it here.
                let size = buffer.byte_size();
                weak.set(key, buffer, is_sampled, size);
            }
            MemoryCache::Bounded(cache) => cache.set(key, buffer, is_sampled),
        }
    }

    /// Get the current resident byte usage (0 unless bounded)
    pub fn size(&self) -> usize {
        match self {
            MemoryCache::Bounded(cache) => cache.size(),
            _ => 0,
        }
    }

    /// Get the configured byte budget (0 unless bounded)
    pub fn max_size(&self) -> usize {
        match self {
            MemoryCache::Bounded(cache) => cache.max_size(),
            _ => 0,
        }
    }

    /// Remove the resident entry at `key`, if present
    pub fn invalidate(&self, key: &str) {
        if let MemoryCache::Bounded(cache) = self {
            cache.invalidate(key);
        }
    }

    /// Evict every resident entry
    pub fn clear_memory(&self) {
        if let MemoryCache::Bounded(cache) = self {
            cache.clear_memory();
        }
    }

    /// Respond to a host memory-pressure signal
    pub fn trim_memory(&self, level: TrimLevel) {
        if let MemoryCache::Bounded(cache) = self {
            cache.trim_memory(level);
        }
    }

    /// Get a statistics snapshot (zeroed unless bounded)
    pub fn stats(&self) -> CacheStats {
        match self {
            MemoryCache::Bounded(cache) => cache.stats(),
            _ => CacheStats::default(),
        }
    }
}
