// SPDX-License-Identifier: GPL-3.0-only

//! Reusable RGBA output buffers keyed by frame size
//!
//! The pool keeps a handle to every buffer it hands out. A buffer is written
//! again only once every other handle is gone, so a frame still shown in the
//! preview is never overwritten by the next conversion.

use crate::media::types::rgba_len;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

/// Buffer reuse counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Checkouts served by an existing buffer
    pub hits: u64,
    /// Checkouts that had to allocate
    pub allocations: u64,
    /// Number of distinct (width, height) buckets
    pub buckets: usize,
    /// Bytes currently held by the pool
    pub pooled_bytes: usize,
}

/// Pool of RGBA buffers keyed by exact (width, height)
///
/// Owned by a single worker, so it needs no locking of its own.
pub struct FramePool {
    buckets: HashMap<(u32, u32), Vec<Arc<Vec<u8>>>>,
    buffers_per_size: usize,
    hits: u64,
    allocations: u64,
}

impl FramePool {
    /// Create a pool that keeps at most `buffers_per_size` buffers per size
    pub fn new(buffers_per_size: usize) -> Self {
        Self {
            buckets: HashMap::new(),
            buffers_per_size: buffers_per_size.max(1),
            hits: 0,
            allocations: 0,
        }
    }

    /// Check out a buffer for a `width` x `height` frame and fill it
    ///
    /// `fill` receives the whole buffer and must overwrite every byte; a
    /// recycled buffer still holds the previous frame.
    pub fn checkout<F, E>(&mut self, width: u32, height: u32, fill: F) -> Result<Arc<Vec<u8>>, E>
    where
        F: FnOnce(&mut [u8]) -> Result<(), E>,
    {
        let len = rgba_len(width, height);
        let bucket = self.buckets.entry((width, height)).or_default();

        let free = bucket
            .iter()
            .position(|buffer| Arc::strong_count(buffer) == 1 && Arc::weak_count(buffer) == 0);

        if let Some(idx) = free
            && let Some(buffer) = Arc::get_mut(&mut bucket[idx])
        {
            fill(buffer.as_mut_slice())?;
            self.hits += 1;
            trace!(width, height, "Frame pool hit");
            return Ok(Arc::clone(&bucket[idx]));
        }

        let mut buffer = vec![0u8; len];
        fill(&mut buffer)?;
        self.allocations += 1;

        let shared = Arc::new(buffer);
        if bucket.len() < self.buffers_per_size {
            bucket.push(Arc::clone(&shared));
            trace!(width, height, pooled = bucket.len(), "Frame pool allocated buffer");
        } else {
            trace!(width, height, "Frame pool full, buffer not retained");
        }
        Ok(shared)
    }

    /// Drop every pooled buffer
    ///
    /// Buffers still referenced by published frames stay alive until those
    /// frames are dropped; the pool just stops tracking them.
    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            hits: self.hits,
            allocations: self.allocations,
            buckets: self.buckets.len(),
            pooled_bytes: self
                .buckets
                .values()
                .flat_map(|bucket| bucket.iter())
                .map(|buffer| buffer.len())
                .sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_with(value: u8) -> impl FnOnce(&mut [u8]) -> Result<(), ()> {
        move |buf| {
            buf.fill(value);
            Ok(())
        }
    }

    #[test]
    fn test_released_buffer_is_reused() {
        let mut pool = FramePool::new(2);
        let first = pool.checkout(4, 2, fill_with(1)).unwrap();
        let first_ptr = Arc::as_ptr(&first);
        drop(first);

        let second = pool.checkout(4, 2, fill_with(2)).unwrap();
        assert_eq!(Arc::as_ptr(&second), first_ptr);
        assert!(second.iter().all(|&b| b == 2));

        let stats = pool.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.allocations, 1);
        assert_eq!(stats.pooled_bytes, 4 * 2 * 4);
    }

    #[test]
    fn test_held_buffer_is_never_overwritten() {
        let mut pool = FramePool::new(2);
        let held = pool.checkout(2, 2, fill_with(7)).unwrap();
        let other = pool.checkout(2, 2, fill_with(9)).unwrap();

        assert!(!Arc::ptr_eq(&held, &other));
        assert!(held.iter().all(|&b| b == 7));
        assert_eq!(pool.stats().allocations, 2);
    }

    #[test]
    fn test_sizes_use_separate_buckets() {
        let mut pool = FramePool::new(1);
        drop(pool.checkout(2, 2, fill_with(0)).unwrap());
        drop(pool.checkout(3, 2, fill_with(0)).unwrap());

        let stats = pool.stats();
        assert_eq!(stats.buckets, 2);
        assert_eq!(stats.allocations, 2);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_full_bucket_does_not_grow() {
        let mut pool = FramePool::new(1);
        let _a = pool.checkout(2, 2, fill_with(0)).unwrap();
        let _b = pool.checkout(2, 2, fill_with(0)).unwrap();
        assert_eq!(pool.stats().pooled_bytes, 16);
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut pool = FramePool::new(2);
        drop(pool.checkout(8, 8, fill_with(0)).unwrap());
        pool.clear();

        let stats = pool.stats();
        assert_eq!(stats.buckets, 0);
        assert_eq!(stats.pooled_bytes, 0);
    }

    #[test]
    fn test_failed_fill_propagates() {
        let mut pool = FramePool::new(1);
        let result: Result<_, &str> = pool.checkout(2, 2, |_| Err("bad plane"));
        assert_eq!(result.unwrap_err(), "bad plane");
    }
}
