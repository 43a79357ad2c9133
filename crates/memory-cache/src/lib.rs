//! Pixload Memory Cache Library
//!
//! In-process cache for decoded image buffers. A byte-bounded strong tier
//! with LRU eviction hands evicted buffers to a pooling allocator when they
//! are unreferenced, and to a weak cold tier otherwise, so recently decoded
//! pixels can be reused without staying inside the budget.

pub mod buffer;
pub mod cache;
pub mod config;
pub mod counter;
pub mod pool;
pub mod strong;
pub mod weak;

pub use buffer::{CacheKey, CacheValue, ImageBuffer, PixelFormat};
pub use cache::MemoryCache;
pub use config::{CacheConfig, ConfigError};
pub use counter::{BufferRefCounter, ReferenceCounter};
pub use pool::{BufferPool, FreeListPool, NoopBufferPool};
pub use strong::{BoundedMemoryCache, CacheStats, TrimLevel};
pub use weak::{BoundedWeakCache, NoopWeakCache, WeakCache};
