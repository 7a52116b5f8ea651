//! Consumer side: element-level dequeue with expiry and partial reads.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::header::{HeaderFields, HeaderRef, HEADER_SIZE};
use crate::buffer::{now_ms, Shared};
use crate::error::{JitterError, JitterResult};
use crate::metrics::{count, Metrics};
use crate::ring::Cursor;

/// The reading half of a jitter buffer.
///
/// Exactly one consumer exists per buffer; it owns the read cursor, so no
/// locking happens on the dequeue path.
pub struct Consumer {
    pub(crate) shared: Arc<Shared>,
    pub(crate) read: Cursor,
}

impl Consumer {
    /// Dequeue up to `elements` elements into `destination`.
    ///
    /// Returns 0 until the play gate has latched. Fails with
    /// [`InvalidArgument`](crate::JitterError::InvalidArgument) when
    /// `destination` cannot hold the requested elements; nothing is
    /// consumed in that case.
    ///
    /// Expired slots are dropped in passing, and a concealment slot whose
    /// upgrade is in flight is skipped rather than waited on. A packet may
    /// be consumed partially; the remainder stays in the ring for the next
    /// call. Returns the number of elements actually written to
    /// `destination`.
    pub fn dequeue(
        &mut self,
        destination: &mut [u8],
        elements: usize,
    ) -> JitterResult<usize> {
        if !self.shared.play.load(Ordering::Acquire) {
            return Ok(0);
        }

        let element_size = self.shared.element_size;
        let required = elements * element_size;
        if destination.len() < required {
            return Err(JitterError::invalid_argument(format!(
                "provided buffer too small: was {}, need {}",
                destination.len(),
                required
            )));
        }

        let base = self.shared.base();
        let capacity = self.shared.capacity;
        let mut dequeued = 0usize;

        while dequeued < required {
            if self.shared.occupancy.load() < HEADER_SIZE {
                break;
            }

            let header = HeaderRef::at(base, self.read.get());
            let sequence_number = header.sequence_number();
            let slot_elements = header.elements();
            let previous_elements = header.previous_elements();
            let timestamp_ms = header.timestamp_ms();
            let concealment = header.concealment();
            debug_assert!(slot_elements > 0);
            debug_assert!(slot_elements <= self.shared.packet_elements);
            self.forward_read(HEADER_SIZE);

            let payload_bytes = slot_elements * element_size;

            // A concealment slot is read under its flag so a late upgrade
            // cannot rewrite the payload mid-copy. If the producer already
            // holds the flag, skip the slot rather than block.
            let mut held = false;
            if concealment {
                if !header.try_acquire() {
                    log::warn!(
                        "dequeue: concealment slot {sequence_number} is being updated, skipping"
                    );
                    self.discard(payload_bytes, slot_elements);
                    continue;
                }
                held = true;
            }

            let age = now_ms().saturating_sub(timestamp_ms);
            if age >= self.shared.max_length_ms {
                if held {
                    header.release();
                }
                self.discard(payload_bytes, slot_elements);
                count(&self.shared.counters.skipped_frames, slot_elements);
                continue;
            }

            let take = payload_bytes.min(required - dequeued);
            self.shared
                .copy_out(self.read.get(), &mut destination[dequeued..dequeued + take]);

            if take < payload_bytes {
                // Partial read: the slot shrinks from the front. The header
                // is rewritten immediately before the remaining payload,
                // with the flag clear in the new image.
                self.forward_read(take);
                self.unwind_read(HEADER_SIZE);
                let new_elements = (payload_bytes - take) / element_size;
                HeaderRef::at(base, self.read.get()).write(&HeaderFields {
                    sequence_number,
                    elements: new_elements,
                    previous_elements,
                    timestamp_ms,
                    concealment,
                });

                // Future walkers step through this slot by its new size, so
                // the next header's previous_elements must follow suit.
                let shrunk_slot = HEADER_SIZE + new_elements * element_size;
                if self.shared.occupancy.load() >= HEADER_SIZE + shrunk_slot {
                    let next_offset = (self.read.get() + shrunk_slot) % capacity;
                    let next = HeaderRef::at(base, next_offset);
                    if next.try_acquire() {
                        next.set_previous_elements(new_elements);
                        next.release();
                    } else {
                        let next_sequence = next.sequence_number();
                        log::error!(
                            "dequeue: slot {next_sequence} is in use after the split of \
                             {sequence_number}, walks will stop there"
                        );
                        self.shared
                            .dont_walk_beyond
                            .store(next_sequence, Ordering::Release);
                    }
                }
            } else {
                if held {
                    header.release();
                }
                self.forward_read(take);
            }
            dequeued += take;
        }

        let dequeued_elements = dequeued / element_size;
        self.shared
            .written_elements
            .fetch_sub(dequeued_elements, Ordering::Relaxed);
        Ok(dequeued_elements)
    }

    /// Buffered media duration.
    pub fn depth(&self) -> Duration {
        self.shared.depth()
    }

    /// Best-effort metrics snapshot.
    pub fn metrics(&self) -> Metrics {
        self.shared.metrics()
    }

    #[inline]
    fn forward_read(&mut self, n: usize) {
        self.read.forward(n);
        self.shared.occupancy.sub(n);
    }

    #[inline]
    fn unwind_read(&mut self, n: usize) {
        self.read.rewind(n);
        self.shared.occupancy.add(n);
    }

    /// Drop a slot's payload without delivering it, keeping the element
    /// count in step with the occupancy.
    fn discard(&mut self, payload_bytes: usize, slot_elements: usize) {
        self.forward_read(payload_bytes);
        self.shared
            .written_elements
            .fetch_sub(slot_elements, Ordering::Relaxed);
    }
}
