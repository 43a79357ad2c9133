//! Reference counting for strong-tier residency
//!
//! Tracks how many live strong-tier entries (plus any external holders)
//! reference a given buffer identity and decides, at the moment the count
//! returns to zero, whether the buffer goes back to the pooling allocator.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::buffer::ImageBuffer;
use crate::pool::BufferPool;

/// Residency reference counting contract
///
/// The strong tier calls [`increment`] exactly once when a buffer becomes
/// resident and [`decrement`] exactly once when it is evicted. The boolean
/// returned by `decrement` is authoritative: `true` means the buffer was
/// handed to the pooling allocator, `false` means the caller must migrate it
/// to the weak tier. A buffer is never both pooled and migrated for the same
/// eviction event.
///
/// [`increment`]: ReferenceCounter::increment
/// [`decrement`]: ReferenceCounter::decrement
pub trait ReferenceCounter: Send + Sync {
    /// Record the start of a strong-tier residency for this buffer
    fn increment(&self, buffer: &Arc<ImageBuffer>);

    /// Record the end of a strong-tier residency for this buffer
    ///
    /// Returns `true` iff the buffer's count reached zero and the pooling
    /// allocator accepted it.
    fn decrement(&self, buffer: &Arc<ImageBuffer>) -> bool;
}

/// Per-buffer count state
struct Count {
    /// Number of live residencies plus external holds
    refs: usize,

    /// Whether the buffer may be returned to the pool at count zero
    poolable: bool,
}

/// Reference counter backed by a pooling allocator
///
/// Counts are keyed by buffer identity ([`ImageBuffer::id`]), not by cache
/// key: the same buffer stored under two keys is counted twice and only
/// becomes pool-eligible when both residencies end. Entries are dropped as
/// soon as their count returns to zero, so the map never outgrows the set of
/// currently tracked buffers.
pub struct BufferRefCounter {
    pool: Arc<dyn BufferPool>,
    counts: Mutex<HashMap<u64, Count>>,
}

impl BufferRefCounter {
    /// Create a counter that offers zero-reference buffers to `pool`
    pub fn new(pool: Arc<dyn BufferPool>) -> Self {
        Self {
            pool,
            counts: Mutex::new(HashMap::new()),
        }
    }

    /// Exclude a tracked buffer from pooling
    ///
    /// Called when an external holder hands the buffer somewhere it may be
    /// read indefinitely (e.g. bound to a view); once unpoolable, the final
    /// decrement reports "not pooled" and the buffer migrates to the weak
    /// tier instead. No-op if the buffer is not currently tracked.
    pub fn mark_unpoolable(&self, buffer: &Arc<ImageBuffer>) {
        let mut counts = self.counts.lock().unwrap();
        match counts.get_mut(&buffer.id()) {
            Some(count) => count.poolable = false,
            None => log::debug!("mark_unpoolable on untracked buffer {}", buffer.id()),
        }
    }

    /// Get the current count for a buffer (0 if untracked)
    pub fn count(&self, buffer: &Arc<ImageBuffer>) -> usize {
        self.counts
            .lock()
            .unwrap()
            .get(&buffer.id())
            .map(|count| count.refs)
            .unwrap_or(0)
    }
}

impl ReferenceCounter for BufferRefCounter {
    fn increment(&self, buffer: &Arc<ImageBuffer>) {
        let mut counts = self.counts.lock().unwrap();
        let count = counts.entry(buffer.id()).or_insert(Count {
            refs: 0,
            poolable: true,
        });
        count.refs += 1;
        log::trace!("buffer {}: refs -> {}", buffer.id(), count.refs);
    }

    fn decrement(&self, buffer: &Arc<ImageBuffer>) -> bool {
        let poolable = {
            let mut counts = self.counts.lock().unwrap();
            let count = match counts.get_mut(&buffer.id()) {
                Some(count) => count,
                None => {
                    log::debug!("decrement on untracked buffer {}", buffer.id());
                    return false;
                }
            };
            count.refs = count.refs.saturating_sub(1);
            log::trace!("buffer {}: refs -> {}", buffer.id(), count.refs);
            if count.refs > 0 {
                return false;
            }
            let poolable = count.poolable;
            counts.remove(&buffer.id());
            poolable
        };

        // Pool insertion happens outside the counter lock; the count entry is
        // already gone, so a concurrent increment starts a fresh residency.
        poolable && self.pool.release(Arc::clone(buffer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PixelFormat;
    use crate::pool::{FreeListPool, NoopBufferPool};

    fn buffer() -> Arc<ImageBuffer> {
        Arc::new(ImageBuffer::allocate(16, 16, PixelFormat::Rgba8888))
    }

    #[test]
    fn test_decrement_at_zero_pools_buffer() {
        let pool = Arc::new(FreeListPool::new(1024 * 1024));
        let counter = BufferRefCounter::new(pool.clone());
        let buffer = buffer();

        counter.increment(&buffer);
        assert_eq!(counter.count(&buffer), 1);

        assert!(counter.decrement(&buffer));
        assert_eq!(counter.count(&buffer), 0);
        assert_eq!(pool.bytes_held(), buffer.byte_size());
    }

    #[test]
    fn test_decrement_above_zero_does_not_pool() {
        let pool = Arc::new(FreeListPool::new(1024 * 1024));
        let counter = BufferRefCounter::new(pool.clone());
        let buffer = buffer();

        counter.increment(&buffer);
        counter.increment(&buffer);

        assert!(!counter.decrement(&buffer));
        assert_eq!(counter.count(&buffer), 1);
        assert_eq!(pool.bytes_held(), 0);

        assert!(counter.decrement(&buffer));
        assert_eq!(pool.bytes_held(), buffer.byte_size());
    }

    #[test]
    fn test_decrement_untracked_buffer_is_tolerated() {
        let pool = Arc::new(FreeListPool::new(1024 * 1024));
        let counter = BufferRefCounter::new(pool.clone());
        let buffer = buffer();

        assert!(!counter.decrement(&buffer));
        assert_eq!(pool.bytes_held(), 0);
    }

    #[test]
    fn test_pool_rejection_reports_not_pooled() {
        let counter = BufferRefCounter::new(Arc::new(NoopBufferPool));
        let buffer = buffer();

        counter.increment(&buffer);
        assert!(!counter.decrement(&buffer));
    }

    #[test]
    fn test_mark_unpoolable_forces_rejection() {
        let pool = Arc::new(FreeListPool::new(1024 * 1024));
        let counter = BufferRefCounter::new(pool.clone());
        let buffer = buffer();

        counter.increment(&buffer);
        counter.mark_unpoolable(&buffer);

        assert!(!counter.decrement(&buffer));
        assert_eq!(pool.bytes_held(), 0);
    }

    #[test]
    fn test_counts_are_per_buffer_identity() {
        let counter = BufferRefCounter::new(Arc::new(NoopBufferPool));
        let a = buffer();
        let b = buffer();

        counter.increment(&a);
        counter.increment(&a);
        counter.increment(&b);

        assert_eq!(counter.count(&a), 2);
        assert_eq!(counter.count(&b), 1);

        counter.decrement(&b);
        assert_eq!(counter.count(&a), 2);
        assert_eq!(counter.count(&b), 0);
    }

    #[test]
    fn test_count_entry_removed_at_zero_and_restarts_fresh() {
        let pool = Arc::new(FreeListPool::new(1024 * 1024));
        let counter = BufferRefCounter::new(pool.clone());
        let buffer = buffer();

        counter.increment(&buffer);
        counter.mark_unpoolable(&buffer);
        assert!(!counter.decrement(&buffer));

        // A new residency starts from a clean slate: poolable again.
        counter.increment(&buffer);
        assert!(counter.decrement(&buffer));
        assert_eq!(pool.bytes_held(), buffer.byte_size());
    }

    #[test]
    fn test_concurrent_increment_decrement_balance() {
        use std::thread;

        let counter = Arc::new(BufferRefCounter::new(Arc::new(NoopBufferPool)));
        let buffer = buffer();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let counter = Arc::clone(&counter);
                let buffer = Arc::clone(&buffer);
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.increment(&buffer);
                        counter.decrement(&buffer);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(counter.count(&buffer), 0);
    }
}
