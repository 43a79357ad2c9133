//! Buffer pooling for decode reuse
//!
//! Provides the pooling-allocator contract consumed by the reference counter
//! and a concrete free-list implementation keyed by buffer dimensions. A
//! pooled buffer can be handed back to the decoder instead of allocating a
//! fresh one for the next decode of the same size.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::buffer::{ImageBuffer, PixelFormat};

/// A pooling allocator that accepts zero-reference buffers for reuse
///
/// The reference counter offers a buffer to the pool exactly when its strong
/// tier residency count reaches zero. The boolean return of [`release`] is
/// authoritative: `true` means the pool now owns the buffer, `false` means
/// the caller must dispose of it some other way (in practice, migrate it to
/// the weak tier).
///
/// [`release`]: BufferPool::release
pub trait BufferPool: Send + Sync {
    /// Offer a buffer for reuse
    ///
    /// Returns `true` if the pool took ownership of the buffer.
    fn release(&self, buffer: Arc<ImageBuffer>) -> bool;

    /// Take a pooled buffer matching the exact size class, if any
    fn take(&self, width: u32, height: u32, format: PixelFormat) -> Option<Arc<ImageBuffer>>;
}

/// Pool that never retains buffers
///
/// Used when pooling is disabled: every release is rejected, so evicted
/// buffers always migrate to the weak tier.
#[derive(Debug, Default)]
pub struct NoopBufferPool;

impl BufferPool for NoopBufferPool {
    fn release(&self, _buffer: Arc<ImageBuffer>) -> bool {
        false
    }

    fn take(&self, _width: u32, _height: u32, _format: PixelFormat) -> Option<Arc<ImageBuffer>> {
        None
    }
}

/// Size class a pooled buffer is filed under. Reuse requires an exact match.
type SizeClass = (u32, u32, PixelFormat);

/// Internal pool state
struct PoolState {
    /// Free lists per size class, most recently released at the back
    free_lists: HashMap<SizeClass, Vec<Arc<ImageBuffer>>>,

    /// Total bytes currently held across all free lists
    bytes_held: usize,

    /// Maximum bytes the pool may hold
    max_size: usize,
}

/// Free-list buffer pool with a total byte cap
///
/// Buffers are filed by `(width, height, format)`; [`take`] serves exact
/// size-class matches only, most recently released first. Releases that
/// would push the pool over its byte cap are rejected.
///
/// A buffer accepted here may still be aliased by callers holding a
/// [`CacheValue`](crate::CacheValue) from an earlier cache hit, so exclusive
/// ownership is verified at reuse time: `take` silently discards pooled
/// buffers that are still referenced elsewhere.
///
/// [`take`]: BufferPool::take
pub struct FreeListPool {
    state: Mutex<PoolState>,
}

impl FreeListPool {
    /// Create a new pool with the specified byte cap
    pub fn new(max_size: usize) -> Self {
        Self {
            state: Mutex::new(PoolState {
                free_lists: HashMap::new(),
                bytes_held: 0,
                max_size,
            }),
        }
    }

    /// Create a new pool with a cap in megabytes
    pub fn with_mb_limit(megabytes: usize) -> Self {
        Self::new(megabytes * 1024 * 1024)
    }

    /// Get the total bytes currently held by the pool
    pub fn bytes_held(&self) -> usize {
        self.state.lock().unwrap().bytes_held
    }

    /// Drop every pooled buffer
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.free_lists.clear();
        state.bytes_held = 0;
        log::debug!("buffer pool cleared");
    }
}

impl BufferPool for FreeListPool {
    fn release(&self, buffer: Arc<ImageBuffer>) -> bool {
        let size = buffer.byte_size();
        if size == 0 {
            return false;
        }

        let mut state = self.state.lock().unwrap();
        if state.bytes_held + size > state.max_size {
            log::trace!(
                "pool rejected buffer {} ({} bytes): cap reached",
                buffer.id(),
                size
            );
            return false;
        }

        let class = (buffer.width(), buffer.height(), buffer.format());
        state.bytes_held += size;
        state.free_lists.entry(class).or_default().push(buffer);
        true
    }

    fn take(&self, width: u32, height: u32, format: PixelFormat) -> Option<Arc<ImageBuffer>> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;
        let class = (width, height, format);

        loop {
            let (buffer, now_empty) = {
                let list = state.free_lists.get_mut(&class)?;
                let buffer = list.pop()?;
                (buffer, list.is_empty())
            };
            if now_empty {
                state.free_lists.remove(&class);
            }
            state.bytes_held = state.bytes_held.saturating_sub(buffer.byte_size());

            // Still aliased by a live reader; unusable for reuse.
            if Arc::strong_count(&buffer) > 1 {
                log::trace!("pool discarded aliased buffer {}", buffer.id());
                continue;
            }
            return Some(buffer);
        }
    }
}
