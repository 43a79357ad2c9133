//! Weak tier: the last-resort cold store
//!
//! Holds buffers evicted from the strong tier without keeping them inside
//! the byte budget. Entries here may vanish at any time (the store prunes
//! itself under its own cap), so callers must treat every lookup as
//! possibly-absent.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::buffer::{CacheKey, CacheValue, ImageBuffer};

/// Weak tier contract consumed by the strong tier
///
/// The strong tier migrates evicted buffers here when the pooling allocator
/// does not reclaim them, and falls through to [`get`] on a local miss. No
/// guarantee is made that a value stored here remains retrievable.
///
/// [`get`]: WeakCache::get
pub trait WeakCache: Send + Sync {
    /// Look up a value; may miss at any time, even right after a `set`
    fn get(&self, key: &str) -> Option<CacheValue>;

    /// Store an evicted buffer with its pre-computed byte size
    fn set(&self, key: CacheKey, buffer: Arc<ImageBuffer>, is_sampled: bool, size: usize);

    /// Drop every entry holding this buffer identity
    fn invalidate(&self, buffer: &Arc<ImageBuffer>);

    /// Whether this implementation is a stub that retains nothing
    ///
    /// Strategy selection uses this to distinguish a genuine weak tier from
    /// the disabled one.
    fn is_noop(&self) -> bool {
        false
    }
}

/// Weak tier stub that retains nothing
#[derive(Debug, Default)]
pub struct NoopWeakCache;

impl WeakCache for NoopWeakCache {
    fn get(&self, _key: &str) -> Option<CacheValue> {
        None
    }

    fn set(&self, _key: CacheKey, _buffer: Arc<ImageBuffer>, _is_sampled: bool, _size: usize) {}

    fn invalidate(&self, _buffer: &Arc<ImageBuffer>) {}

    fn is_noop(&self) -> bool {
        true
    }
}

/// Stored entry
struct WeakEntry {
    buffer: Arc<ImageBuffer>,
    is_sampled: bool,
    size: usize,
}

/// Internal store state
struct WeakState {
    /// Map from cache key to entry
    entries: HashMap<CacheKey, WeakEntry>,

    /// Insertion order, oldest at the front
    order: VecDeque<CacheKey>,

    /// Current bytes across all entries
    bytes_used: usize,

    /// Byte cap of this store
    max_size: usize,
}

impl WeakState {
    /// Remove an entry and fix the bookkeeping
    fn remove(&mut self, key: &str) -> Option<WeakEntry> {
        let entry = self.entries.remove(key)?;
        self.order.retain(|k| k != key);
        self.bytes_used = self.bytes_used.saturating_sub(entry.size);
        Some(entry)
    }

    /// Drop oldest entries until within the cap
    fn prune(&mut self) {
        while self.bytes_used > self.max_size {
            let key = match self.order.pop_front() {
                Some(key) => key,
                None => break,
            };
            if let Some(entry) = self.entries.remove(&key) {
                self.bytes_used = self.bytes_used.saturating_sub(entry.size);
                log::trace!("weak tier pruned {} ({} bytes)", key, entry.size);
            }
        }
    }
}

/// Concrete weak tier with its own byte cap
///
/// An insertion-ordered store that prunes oldest-first whenever its cap is
/// exceeded. From the strong tier's perspective entries vanish
/// nondeterministically; nothing placed here is guaranteed to survive until
/// the next lookup.
pub struct BoundedWeakCache {
    state: Mutex<WeakState>,
}

impl BoundedWeakCache {
    /// Create a weak tier with the specified byte cap
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(WeakState {
                entries: HashMap::new(),
                order: VecDeque::new(),
                bytes_used: 0,
                max_size,
            }),
        }
    }

    /// Create a weak tier with a cap in megabytes
    pub fn with_mb_limit(megabytes: usize) -> Self {
        Self::new(megabytes * 1024 * 1024)
    }

    /// Get the number of entries currently held
    pub fn len(&self) -> usize {
        self.state.lock().unwrap().entries.len()
    }

    /// Whether the store currently holds no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the bytes currently held
    pub fn bytes_used(&self) -> usize {
        self.state.lock().unwrap().bytes_used
    }
}

impl WeakCache for BoundedWeakCache {
    fn get(&self, key: &str) -> Option<CacheValue> {
        let state = self.state.lock().unwrap();
        state.entries.get(key).map(|entry| CacheValue {
            buffer: Arc::clone(&entry.buffer),
            is_sampled: entry.is_sampled,
        })
    }

    fn set(&self, key: CacheKey, buffer: Arc<ImageBuffer>, is_sampled: bool, size: usize) {
        let mut state = self.state.lock().unwrap();

        state.remove(&key);
        if size > state.max_size {
            // Would be pruned immediately; don't bother storing it.
            log::trace!("weak tier dropped oversized {} ({} bytes)", key, size);
            return;
        }

        state.bytes_used += size;
        state.order.push_back(key.clone());
        state.entries.insert(
            key,
            WeakEntry {
                buffer,
                is_sampled,
                size,
            },
        );
        state.prune();
    }

    fn invalidate(&self, buffer: &Arc<ImageBuffer>) {
        let mut state = self.state.lock().unwrap();
        let id = buffer.id();
        let keys: Vec<CacheKey> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.buffer.id() == id)
            .map(|(key, _)| key.clone())
            .collect();
        for key in keys {
            state.remove(&key);
            log::trace!("weak tier invalidated {} for buffer {}", key, id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PixelFormat;

    fn buffer(width: u32, height: u32) -> Arc<ImageBuffer> {
        Arc::new(ImageBuffer::allocate(width, height, PixelFormat::Gray8))
    }

    #[test]
    fn test_set_then_get() {
        let cache = BoundedWeakCache::new(1024);
        let buf = buffer(16, 16);

        cache.set("a".to_string(), Arc::clone(&buf), true, buf.byte_size());

        let value = cache.get("a").expect("entry should be present");
        assert!(Arc::ptr_eq(&value.buffer, &buf));
        assert!(value.is_sampled);
        assert!(cache.get("b").is_none());
    }

    #[test]
    fn test_prunes_oldest_first_when_over_cap() {
        // Cap fits two 256-byte buffers
        let cache = BoundedWeakCache::new(512);
        let a = buffer(16, 16);
        let b = buffer(16, 16);
        let c = buffer(16, 16);

        cache.set("a".to_string(), a, false, 256);
        cache.set("b".to_string(), b, false, 256);
        cache.set("c".to_string(), c, false, 256);

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.bytes_used(), 512);
    }

    #[test]
    fn test_replace_updates_bookkeeping_once() {
        let cache = BoundedWeakCache::new(1024);
        let old = buffer(16, 16);
        let new = buffer(8, 8);

        cache.set("a".to_string(), old, false, 256);
        cache.set("a".to_string(), Arc::clone(&new), true, 64);

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.bytes_used(), 64);

        let value = cache.get("a").unwrap();
        assert!(Arc::ptr_eq(&value.buffer, &new));
        assert!(value.is_sampled);
    }

    #[test]
    fn test_oversized_entry_is_dropped() {
        let cache = BoundedWeakCache::new(128);
        let buf = buffer(16, 16); // 256 bytes

        cache.set("a".to_string(), Arc::clone(&buf), false, buf.byte_size());

        assert!(cache.get("a").is_none());
        assert_eq!(cache.bytes_used(), 0);
    }

    #[test]
    fn test_invalidate_removes_all_entries_for_buffer() {
        let cache = BoundedWeakCache::new(1024);
        let shared = buffer(8, 8);
        let other = buffer(8, 8);

        cache.set("a".to_string(), Arc::clone(&shared), false, 64);
        cache.set("b".to_string(), Arc::clone(&shared), false, 64);
        cache.set("c".to_string(), Arc::clone(&other), false, 64);

        cache.invalidate(&shared);

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.bytes_used(), 64);
    }

    #[test]
    fn test_noop_stub_retains_nothing() {
        let cache = NoopWeakCache;
        let buf = buffer(8, 8);

        cache.set("a".to_string(), Arc::clone(&buf), false, 64);

        assert!(cache.get("a").is_none());
        assert!(cache.is_noop());
        assert!(!BoundedWeakCache::new(1024).is_noop());
    }
}
