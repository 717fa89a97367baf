//! A thread-safe pool of growable byte buffers, tuned for the dominant
//! "many metrics, few points per metric" workload: lots of small per-column
//! allocations that would otherwise round-trip through the global allocator
//! once per metric.
//!
//! Buffers handed out by the pool may carry residual bytes from a previous
//! use. Callers must always track their own logical length (`Buffer::len`)
//! rather than assume the backing storage is zeroed.

use std::sync::{Mutex, OnceLock};

/// Buffers smaller than this grow by `max(additional, 256)`; larger buffers
/// grow by `max(additional, capacity / 4)`. See [`Buffer::grow`].
const SMALL_BUFFER_THRESHOLD: usize = 4096;
const SMALL_BUFFER_MIN_GROWTH: usize = 256;

fn global_pool() -> &'static Mutex<Vec<Vec<u8>>> {
    static POOL: OnceLock<Mutex<Vec<Vec<u8>>>> = OnceLock::new();
    POOL.get_or_init(|| Mutex::new(Vec::new()))
}

/// Acquire a buffer from the process-wide pool, or allocate a fresh one if
/// the pool is empty. The returned buffer's logical length is always 0.
pub fn acquire() -> Buffer {
    let mut raw = global_pool()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .pop()
        .unwrap_or_default();
    raw.clear();
    Buffer { raw, len: 0 }
}

/// Return a buffer to the process-wide pool for reuse. Its contents are not
/// cleared; the next `acquire` resets the logical length but not the bytes.
pub fn release(buffer: Buffer) {
    let mut pool = global_pool().lock().unwrap_or_else(|e| e.into_inner());
    // Keep the pool from growing unboundedly under a workload that briefly
    // spikes to many concurrent buffers.
    if pool.len() < 4096 {
        pool.push(buffer.raw);
    }
}

/// A growable byte buffer on loan from the pool.
///
/// `raw.len()` is always >= the logical `len`; bytes in `raw[len..]` are
/// leftover from a previous use and must never be read as meaningful data.
pub struct Buffer {
    raw: Vec<u8>,
    len: usize,
}

impl Buffer {
    /// A standalone buffer not associated with any pool, useful in tests.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            raw: Vec::with_capacity(capacity),
            len: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.raw.capacity()
    }

    /// Ensure capacity for at least `additional` more bytes beyond the
    /// current logical length, following the amortized growth policy from
    /// the format spec: grow by `max(additional, capacity/4)` once capacity
    /// exceeds 4 KiB, otherwise `max(additional, 256)`. Does not change the
    /// logical length.
    pub fn grow(&mut self, additional: usize) {
        let capacity = self.raw.capacity();
        if capacity >= self.len + additional {
            return;
        }
        let floor = if capacity > SMALL_BUFFER_THRESHOLD {
            capacity / 4
        } else {
            SMALL_BUFFER_MIN_GROWTH
        };
        let grow_by = additional.max(floor);
        self.raw.reserve(grow_by);
    }

    /// Grow capacity if needed, then advance the logical length by
    /// `additional`. The newly exposed bytes are whatever was left over in
    /// the backing storage — never assume they are zero.
    pub fn extend_or_grow(&mut self, additional: usize) {
        self.grow(additional);
        let new_len = self.len + additional;
        // SAFETY: `grow` just reserved capacity >= new_len, and `u8` has no
        // validity invariant, so bytes in [len, new_len) are valid to expose
        // even though their contents are unspecified leftover data.
        unsafe {
            self.raw.set_len(new_len);
        }
        self.len = new_len;
    }

    /// Append bytes, growing as needed.
    pub fn append_bytes(&mut self, bytes: &[u8]) {
        self.grow(bytes.len());
        if self.raw.len() < self.len {
            // Shouldn't happen in normal use, but keep raw/len coherent.
            self.raw.resize(self.len, 0);
        }
        self.raw.truncate(self.len);
        self.raw.extend_from_slice(bytes);
        self.len += bytes.len();
    }

    /// Borrow the logically-valid byte range `[lo, hi)`.
    pub fn slice(&self, lo: usize, hi: usize) -> &[u8] {
        assert!(hi <= self.len, "slice {}..{} out of bounds (len {})", lo, hi, self.len);
        &self.raw[lo..hi]
    }

    /// Borrow the full logically-valid bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.raw[..self.len]
    }

    /// Mutable access to the full logically-valid bytes.
    #[inline]
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.raw[..self.len]
    }

    /// Reset the logical length to zero. The backing storage is retained
    /// (and its bytes are untouched) so a later `append_bytes` reuses the
    /// allocation without a fresh grow.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Copy out the logically-valid bytes as an owned `Vec<u8>`.
    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }
}

/// RAII guard that returns its [`Buffer`] to the global pool on drop.
///
/// This is the scoped-acquisition discipline required by the resource model:
/// every exit path — success, error, or panic unwinding — releases the
/// buffer exactly once.
pub struct PooledBuffer {
    buffer: Option<Buffer>,
}

impl PooledBuffer {
    pub fn acquire() -> Self {
        Self {
            buffer: Some(acquire()),
        }
    }
}

impl std::ops::Deref for PooledBuffer {
    type Target = Buffer;
    fn deref(&self) -> &Buffer {
        self.buffer.as_ref().expect("buffer taken before drop")
    }
}

impl std::ops::DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Buffer {
        self.buffer.as_mut().expect("buffer taken before drop")
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            release(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_starts_empty() {
        let buf = acquire();
        assert_eq!(buf.len(), 0);
        assert!(buf.is_empty());
    }

    #[test]
    fn append_bytes_accumulates() {
        let mut buf = acquire();
        buf.append_bytes(b"hello");
        buf.append_bytes(b" world");
        assert_eq!(buf.as_bytes(), b"hello world");
        assert_eq!(buf.len(), 11);
    }

    #[test]
    fn grow_small_buffer_floor() {
        let mut buf = Buffer::with_capacity(0);
        buf.grow(10);
        assert!(buf.capacity() >= SMALL_BUFFER_MIN_GROWTH.min(10).max(10));
    }

    #[test]
    fn grow_large_buffer_quarter() {
        let mut buf = Buffer::with_capacity(SMALL_BUFFER_THRESHOLD * 2);
        buf.append_bytes(&vec![0u8; SMALL_BUFFER_THRESHOLD * 2]);
        let cap_before = buf.capacity();
        buf.grow(1);
        assert!(buf.capacity() >= cap_before + cap_before / 4);
    }

    #[test]
    fn extend_or_grow_advances_len_without_reading_garbage_as_error() {
        let mut buf = acquire();
        buf.extend_or_grow(16);
        assert_eq!(buf.len(), 16);
        assert_eq!(buf.as_bytes().len(), 16);
    }

    #[test]
    fn clear_retains_capacity() {
        let mut buf = acquire();
        buf.append_bytes(&[1, 2, 3, 4]);
        let cap = buf.capacity();
        buf.clear();
        assert_eq!(buf.len(), 0);
        assert_eq!(buf.capacity(), cap);
    }

    #[test]
    fn pooled_buffer_returns_to_pool_on_drop() {
        {
            let mut guard = PooledBuffer::acquire();
            guard.append_bytes(b"reuse me");
        }
        let guard2 = PooledBuffer::acquire();
        // We can't assert identity of the allocation (pool is a free stack),
        // but acquiring again should succeed without issue.
        assert_eq!(guard2.len(), 0);
    }

    #[test]
    fn release_caps_pool_growth() {
        for _ in 0..5000 {
            release(Buffer::with_capacity(8));
        }
        // Doesn't panic or grow unboundedly; exact size isn't part of the contract.
        let pool = global_pool().lock().unwrap();
        assert!(pool.len() <= 4096);
    }
}
