//! Ring cursors and occupancy.
//!
//! Under the single-producer/single-consumer discipline each offset has
//! exactly one mutator, so the offsets themselves are plain fields owned by
//! their handle. The byte occupancy is the only cross-thread coordination
//! point: the producer publishes committed bytes with a Release add, the
//! consumer observes them with an Acquire load and frees them with a
//! Release sub.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Cache-line aligned wrapper to prevent false sharing between producer and
/// consumer state.
#[repr(C, align(64))]
pub(crate) struct CachePadded<T>(pub T);

/// Atomic byte occupancy of the ring, always in `[0, capacity]`.
pub(crate) struct Occupancy {
    written: CachePadded<AtomicUsize>,
}

impl Occupancy {
    pub fn new() -> Self {
        Self {
            written: CachePadded(AtomicUsize::new(0)),
        }
    }

    /// Bytes currently live in the ring. Acquire: pairs with `add` so the
    /// caller sees the bytes the publisher committed before the count.
    #[inline]
    pub fn load(&self) -> usize {
        self.written.0.load(Ordering::Acquire)
    }

    /// Publish `n` more live bytes. Release: the caller must have finished
    /// writing them.
    #[inline]
    pub fn add(&self, n: usize) {
        self.written.0.fetch_add(n, Ordering::Release);
    }

    /// Retire `n` live bytes. Release: the caller must be done reading them.
    #[inline]
    pub fn sub(&self, n: usize) {
        self.written.0.fetch_sub(n, Ordering::Release);
    }
}

/// A single-owner offset into `[0, capacity)`.
#[derive(Debug)]
pub(crate) struct Cursor {
    offset: usize,
    capacity: usize,
}

impl Cursor {
    pub fn new(capacity: usize) -> Self {
        Self {
            offset: 0,
            capacity,
        }
    }

    #[inline]
    pub fn get(&self) -> usize {
        self.offset
    }

    /// Advance by `n` bytes, wrapping.
    #[inline]
    pub fn forward(&mut self, n: usize) {
        self.offset = (self.offset + n) % self.capacity;
    }

    /// Move back by `n` bytes (`n <= capacity`), wrapping.
    #[inline]
    pub fn rewind(&mut self, n: usize) {
        debug_assert!(n <= self.capacity);
        self.offset = (self.offset + self.capacity - n) % self.capacity;
    }
}

/// Modular backwards step used by the update walker on snapshot offsets.
#[inline]
pub(crate) fn sub_mod(offset: usize, n: usize, capacity: usize) -> usize {
    debug_assert!(n <= capacity);
    (offset + capacity - n) % capacity
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_wraps_forward_and_back() {
        let mut c = Cursor::new(100);
        c.forward(90);
        assert_eq!(c.get(), 90);
        c.forward(15);
        assert_eq!(c.get(), 5);
        c.rewind(10);
        assert_eq!(c.get(), 95);
    }

    #[test]
    fn occupancy_tracks_adds_and_subs() {
        let occ = Occupancy::new();
        occ.add(64);
        occ.add(16);
        assert_eq!(occ.load(), 80);
        occ.sub(80);
        assert_eq!(occ.load(), 0);
    }

    #[test]
    fn sub_mod_wraps() {
        assert_eq!(sub_mod(5, 10, 100), 95);
        assert_eq!(sub_mod(50, 50, 100), 0);
    }
}
