//! On-ring slot header.
//!
//! Each slot is laid out as `[SlotHeader][payload]`. Headers live inside
//! the ring bytes and are mutated in place: the consumer rewrites
//! `elements` during partial reads, the producer clears `concealment`
//! during upgrades, and both fix `previous_elements` for future walkers.
//!
//! Because a partial read shrinks a slot from the front, header start
//! offsets are element-size multiples and not guaranteed to be aligned to
//! the header's natural boundary. All multi-byte fields are therefore
//! accessed through unaligned raw pointer reads and writes; the one field
//! with cross-thread handoff semantics, `in_use`, is a single-byte atomic
//! and is valid at any address.

use std::mem::{offset_of, size_of};
use std::sync::atomic::{AtomicBool, Ordering};

/// The per-slot metadata record. Field layout is fixed by `repr(C)` and
/// checked below; the struct itself is only instantiated as a staging value
/// in [`HeaderRef::write`].
#[repr(C)]
pub(crate) struct SlotHeader {
    /// Producer-assigned monotonic id.
    pub sequence_number: u64,
    /// Element count currently remaining in this slot's payload.
    pub elements: u64,
    /// `elements` of the header immediately behind this one.
    pub previous_elements: u64,
    /// Enqueue wall-clock instant in milliseconds.
    pub timestamp_ms: u64,
    /// True iff the payload is a synthesized placeholder.
    pub concealment: bool,
    /// Set while a party is mutating this header or its payload.
    pub in_use: AtomicBool,
    _pad: [u8; 6],
}

pub(crate) const HEADER_SIZE: usize = size_of::<SlotHeader>();

// The header is copied byte-for-byte into ring memory; its size and field
// placement must be stable.
const _: () = assert!(HEADER_SIZE == 40);
const _: () = assert!(offset_of!(SlotHeader, in_use) == 33);

const SEQUENCE_OFFSET: usize = offset_of!(SlotHeader, sequence_number);
const ELEMENTS_OFFSET: usize = offset_of!(SlotHeader, elements);
const PREVIOUS_OFFSET: usize = offset_of!(SlotHeader, previous_elements);
const TIMESTAMP_OFFSET: usize = offset_of!(SlotHeader, timestamp_ms);
const CONCEALMENT_OFFSET: usize = offset_of!(SlotHeader, concealment);
const IN_USE_OFFSET: usize = offset_of!(SlotHeader, in_use);

/// Staging values for writing a fresh header image into the ring.
#[derive(Debug, Clone, Copy)]
pub(crate) struct HeaderFields {
    pub sequence_number: u64,
    pub elements: usize,
    pub previous_elements: usize,
    pub timestamp_ms: u64,
    pub concealment: bool,
}

/// A view of one header inside the ring.
///
/// Carries a raw pointer so it can outlive borrows of the handles that
/// created it; every accessor goes through unaligned loads/stores except
/// the `in_use` flag, which is a real atomic.
#[derive(Clone, Copy)]
pub(crate) struct HeaderRef {
    ptr: *mut u8,
}

impl HeaderRef {
    /// View the header starting at `offset` in a ring based at `base`.
    ///
    /// Callers must pass `offset < ring length`; the double mapping makes
    /// the trailing header bytes readable even when they cross the wrap
    /// boundary.
    #[inline]
    pub fn at(base: *mut u8, offset: usize) -> Self {
        // SAFETY: offset stays within the primary mapping, and the header
        // extends at most HEADER_SIZE bytes into the alias half.
        Self {
            ptr: unsafe { base.add(offset) },
        }
    }

    #[inline]
    fn read_u64(&self, field_offset: usize) -> u64 {
        // SAFETY: self.ptr points at a header within the mapped region;
        // field_offset is a compile-time field offset inside it.
        unsafe { (self.ptr.add(field_offset) as *const u64).read_unaligned() }
    }

    #[inline]
    fn write_u64(&self, field_offset: usize, value: u64) {
        // SAFETY: as in read_u64; writes stay inside the mapped region.
        unsafe { (self.ptr.add(field_offset) as *mut u64).write_unaligned(value) }
    }

    #[inline]
    pub fn sequence_number(&self) -> u64 {
        self.read_u64(SEQUENCE_OFFSET)
    }

    #[inline]
    pub fn elements(&self) -> usize {
        self.read_u64(ELEMENTS_OFFSET) as usize
    }

    #[inline]
    pub fn previous_elements(&self) -> usize {
        self.read_u64(PREVIOUS_OFFSET) as usize
    }

    #[inline]
    pub fn set_previous_elements(&self, elements: usize) {
        self.write_u64(PREVIOUS_OFFSET, elements as u64);
    }

    #[inline]
    pub fn timestamp_ms(&self) -> u64 {
        self.read_u64(TIMESTAMP_OFFSET)
    }

    #[inline]
    pub fn concealment(&self) -> bool {
        // SAFETY: single-byte read inside the header.
        unsafe { self.ptr.add(CONCEALMENT_OFFSET).read() != 0 }
    }

    #[inline]
    pub fn set_concealment(&self, concealment: bool) {
        // SAFETY: single-byte write inside the header.
        unsafe { self.ptr.add(CONCEALMENT_OFFSET).write(concealment as u8) }
    }

    #[inline]
    fn in_use(&self) -> &AtomicBool {
        // SAFETY: AtomicBool is one byte with alignment 1, so any address
        // inside the mapping is valid for it.
        unsafe { &*(self.ptr.add(IN_USE_OFFSET) as *const AtomicBool) }
    }

    /// Try to take the slot's mutation flag. Returns false if another party
    /// holds it. Acquire pairs with the holder's `release`.
    #[inline]
    pub fn try_acquire(&self) -> bool {
        !self.in_use().swap(true, Ordering::Acquire)
    }

    /// Drop the mutation flag, publishing any header or payload edits made
    /// while holding it.
    #[inline]
    pub fn release(&self) {
        self.in_use().store(false, Ordering::Release);
    }

    /// Write a complete header image with the flag clear.
    pub fn write(&self, fields: &HeaderFields) {
        let image = SlotHeader {
            sequence_number: fields.sequence_number,
            elements: fields.elements as u64,
            previous_elements: fields.previous_elements as u64,
            timestamp_ms: fields.timestamp_ms,
            concealment: fields.concealment,
            in_use: AtomicBool::new(false),
            _pad: [0; 6],
        };
        // SAFETY: the full header lies inside the mapped region; the writer
        // owns this slot (uncommitted, or held via in_use) so nothing else
        // interprets the bytes mid-write.
        unsafe { (self.ptr as *mut SlotHeader).write_unaligned(image) }
    }
}
