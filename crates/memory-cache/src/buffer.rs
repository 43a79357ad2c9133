//! Decoded image buffers and cache value types
//!
//! Defines the payload types shared by every cache tier: the decoded bitmap
//! buffer itself, the pixel formats the decoder produces, and the immutable
//! value view handed back to callers on a cache hit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A cache key that uniquely addresses one logical decoded image result.
///
/// Keys are opaque strings produced by the request pipeline (typically the
/// source URI plus transformation parameters). The cache only compares and
/// hashes them; it never parses their contents.
pub type CacheKey = String;

/// Pixel layout of a decoded buffer.
///
/// The cache itself never inspects pixel data; the format only participates
/// in byte-size computation and pool size-class matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32-bit RGBA, 4 bytes per pixel
    Rgba8888,
    /// 16-bit RGB, 2 bytes per pixel
    Rgb565,
    /// 8-bit grayscale, 1 byte per pixel
    Gray8,
}

impl PixelFormat {
    /// Get the number of bytes one pixel occupies in this format
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgba8888 => 4,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Gray8 => 1,
        }
    }
}

/// Source of process-unique buffer identities. Never reused, so a stale
/// reference-count entry can never collide with a newly decoded buffer.
static NEXT_BUFFER_ID: AtomicU64 = AtomicU64::new(1);

/// A decoded bitmap buffer
///
/// The payload cached by the strong and weak tiers and recycled by the
/// buffer pool. Pixel contents are opaque to the cache; only the byte size
/// and the identity matter for cache bookkeeping.
///
/// Buffers are shared as `Arc<ImageBuffer>` between the tiers, the pool and
/// callers holding a [`CacheValue`]. The `id` is the buffer's identity for
/// reference counting: two decodes of the same source produce distinct ids.
#[derive(Debug)]
pub struct ImageBuffer {
    /// Process-unique identity, assigned at construction
    id: u64,

    /// Width in pixels
    width: u32,

    /// Height in pixels
    height: u32,

    /// Pixel layout of `data`
    format: PixelFormat,

    /// Raw pixel data
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Create a buffer from already-decoded pixel data
    ///
    /// `data.len()` must equal `width * height * format.bytes_per_pixel()`.
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        debug_assert_eq!(
            data.len(),
            width as usize * height as usize * format.bytes_per_pixel(),
            "pixel data length does not match dimensions"
        );
        Self {
            id: NEXT_BUFFER_ID.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            format,
            data,
        }
    }

    /// Allocate a zero-filled buffer of the given dimensions
    pub fn allocate(width: u32, height: u32, format: PixelFormat) -> Self {
        let len = width as usize * height as usize * format.bytes_per_pixel();
        Self::new(width, height, format, vec![0u8; len])
    }

    /// Get the process-unique identity of this buffer
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Get the width in pixels
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Get the height in pixels
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get the pixel layout of this buffer
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    /// Get the raw pixel data
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Get the memory size of this buffer in bytes
    ///
    /// Computed from the pixel data; this is the unit of all cache capacity
    /// accounting.
    pub fn byte_size(&self) -> usize {
        self.data.len()
    }
}

/// An immutable cache hit returned to callers
///
/// Exposes the decoded buffer plus whether it is a downsampled approximation
/// of the full-resolution source. Callers use `is_sampled` to decide whether
/// to accept the hit for a full-resolution request.
#[derive(Debug, Clone)]
pub struct CacheValue {
    /// The decoded image payload
    pub buffer: Arc<ImageBuffer>,

    /// Whether the buffer is a downsampled approximation of the source
    pub is_sampled: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_byte_size_matches_dimensions() {
        let buffer = ImageBuffer::allocate(64, 32, PixelFormat::Rgba8888);
        assert_eq!(buffer.byte_size(), 64 * 32 * 4);

        let buffer = ImageBuffer::allocate(64, 32, PixelFormat::Rgb565);
        assert_eq!(buffer.byte_size(), 64 * 32 * 2);

        let buffer = ImageBuffer::allocate(64, 32, PixelFormat::Gray8);
        assert_eq!(buffer.byte_size(), 64 * 32);
    }

    #[test]
    fn test_buffer_ids_are_unique() {
        let a = ImageBuffer::allocate(8, 8, PixelFormat::Gray8);
        let b = ImageBuffer::allocate(8, 8, PixelFormat::Gray8);
        let c = ImageBuffer::new(8, 8, PixelFormat::Gray8, vec![0u8; 64]);

        assert_ne!(a.id(), b.id());
        assert_ne!(b.id(), c.id());
        assert_ne!(a.id(), c.id());
    }

    #[test]
    fn test_new_preserves_pixel_data() {
        let data: Vec<u8> = (0..64).collect();
        let buffer = ImageBuffer::new(8, 8, PixelFormat::Gray8, data.clone());

        assert_eq!(buffer.data(), data.as_slice());
        assert_eq!(buffer.width(), 8);
        assert_eq!(buffer.height(), 8);
        assert_eq!(buffer.format(), PixelFormat::Gray8);
    }

    #[test]
    fn test_cache_value_shares_buffer() {
        let buffer = Arc::new(ImageBuffer::allocate(8, 8, PixelFormat::Gray8));
        let value = CacheValue {
            buffer: Arc::clone(&buffer),
            is_sampled: true,
        };

        let clone = value.clone();
        assert!(Arc::ptr_eq(&clone.buffer, &buffer));
        assert!(clone.is_sampled);
    }
}
