//! Producer side: enqueue, prepare, concealment synthesis and in-place
//! upgrades of previously-synthesized slots.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use crate::buffer::header::{HeaderFields, HeaderRef, HEADER_SIZE};
use crate::buffer::{now_ms, Shared, WALK_UNRESTRICTED};
use crate::error::{JitterError, JitterResult};
use crate::metrics::{count, Metrics};
use crate::packet::{ConcealmentSlot, Packet};
use crate::ring::cursors::sub_mod;
use crate::ring::Cursor;

/// The writing half of a jitter buffer.
///
/// Exactly one producer exists per buffer; it owns the write cursor and all
/// sequence bookkeeping, so no locking happens on the enqueue path.
pub struct Producer {
    pub(crate) shared: Arc<Shared>,
    pub(crate) write: Cursor,
    /// Highest sequence number ever written, `None` before the first packet.
    pub(crate) last_written_sequence_number: Option<u64>,
    /// `elements` of the most recently written slot; seeds backward walks.
    pub(crate) latest_written_elements: usize,
}

impl Producer {
    /// Enqueue an ordered batch of packets.
    ///
    /// Packets at or below the highest written sequence number are treated
    /// as upgrades for existing concealment slots. A gap above it first
    /// synthesizes the missing packets through `conceal`, which receives
    /// in-ring payload regions to fill. After the batch, the buffer tops
    /// itself up to `min_length` (while playing) and latches the play gate
    /// once it holds one and a half times `min_length`.
    ///
    /// Returns the total number of elements enqueued: real, concealed and
    /// updated. When the ring runs out of space the remaining packets are
    /// dropped and the partial count is returned.
    pub fn enqueue(
        &mut self,
        packets: &[Packet<'_>],
        mut conceal: impl FnMut(&mut [ConcealmentSlot<'_>]),
    ) -> JitterResult<usize> {
        let mut enqueued = 0usize;

        for packet in packets {
            if let Some(last) = self.last_written_sequence_number {
                if packet.sequence_number <= last {
                    enqueued += self.update(packet);
                    continue;
                }
                let missing = (packet.sequence_number - last - 1) as usize;
                if missing > 0 {
                    let concealed = self.generate_concealment(missing, &mut conceal);
                    count(&self.shared.counters.concealed_frames, concealed);
                    enqueued += concealed;
                }
            }

            if packet.elements != self.shared.packet_elements {
                return Err(JitterError::invalid_argument(format!(
                    "supplied packet elements must match declared number of elements: got {}, expected {}",
                    packet.elements, self.shared.packet_elements
                )));
            }
            if packet.data.len() != packet.elements * self.shared.element_size {
                return Err(JitterError::invalid_argument(format!(
                    "packet data length {} does not cover {} elements of {} bytes",
                    packet.data.len(),
                    packet.elements,
                    self.shared.element_size
                )));
            }

            let written = self.copy_packet_in(packet);
            if written == 0 {
                log::warn!(
                    "enqueue has no more space, packet {} will be lost",
                    packet.sequence_number
                );
                break;
            }
            enqueued += written;
            self.last_written_sequence_number = Some(packet.sequence_number);
        }

        // Top the buffer back up to the minimum fill level while playing.
        let depth_ms = self.shared.depth_ms();
        if self.shared.play.load(Ordering::Acquire) && self.shared.min_length_ms > depth_ms {
            let gap_ms = self.shared.min_length_ms - depth_ms;
            let per_packet_ms = self.shared.packet_elements as u64 * 1000
                / self.shared.clock_rate as u64;
            let to_conceal = gap_ms.div_ceil(per_packet_ms) as usize;
            let filled = self.generate_concealment(to_conceal, &mut conceal);
            count(&self.shared.counters.filled_packets, filled);
            enqueued += filled;
        }

        // One-way play gate.
        if !self.shared.play.load(Ordering::Acquire)
            && self.shared.depth_ms() >= self.shared.min_length_ms * 3 / 2
        {
            self.shared.play.store(true, Ordering::Release);
        }

        Ok(enqueued)
    }

    /// Hint that real packet `sequence_number` is about to be enqueued.
    ///
    /// Eagerly synthesizes the concealment packets a later [`enqueue`] of
    /// that sequence would need. Returns the number of elements
    /// synthesized; 0 when nothing has been written yet, or when the
    /// sequence is not ahead of the next expected one.
    ///
    /// [`enqueue`]: Producer::enqueue
    pub fn prepare(
        &mut self,
        sequence_number: u64,
        mut conceal: impl FnMut(&mut [ConcealmentSlot<'_>]),
    ) -> usize {
        let Some(last) = self.last_written_sequence_number else {
            return 0;
        };
        if sequence_number <= last + 1 {
            // An update or the next in-order packet; nothing to synthesize.
            return 0;
        }
        let missing = (sequence_number - last - 1) as usize;
        let concealed = self.generate_concealment(missing, &mut conceal);
        count(&self.shared.counters.concealed_frames, concealed);
        concealed
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
    fn forward_write(&mut self, n: usize) {
        self.write.forward(n);
        self.shared.occupancy.add(n);
    }

    /// Copy a real packet into the ring as one slot. Returns the number of
    /// elements accepted; 0 when not even one element fits. The header is
    /// only committed once at least one whole element has been staged, so
    /// the consumer never observes a payload-less slot.
    fn copy_packet_in(&mut self, packet: &Packet<'_>) -> usize {
        let element_size = self.shared.element_size;
        let occupied = self.shared.occupancy.load();
        let free = self.shared.capacity - occupied;
        if free < HEADER_SIZE {
            return 0;
        }

        let available = free - HEADER_SIZE;
        let whole_elements = packet.data.len().min(available) / element_size * element_size;
        if whole_elements == 0 {
            return 0;
        }

        let header_offset = self.write.get();
        let payload_offset = (header_offset + HEADER_SIZE) % self.shared.capacity;
        self.shared
            .copy_in(payload_offset, &packet.data[..whole_elements]);

        let elements = whole_elements / element_size;
        HeaderRef::at(self.shared.base(), header_offset).write(&HeaderFields {
            sequence_number: packet.sequence_number,
            elements,
            previous_elements: self.latest_written_elements,
            timestamp_ms: now_ms(),
            concealment: false,
        });

        self.forward_write(HEADER_SIZE + whole_elements);
        self.shared
            .written_elements
            .fetch_add(elements, Ordering::Relaxed);
        self.latest_written_elements = elements;
        elements
    }

    /// Synthesize up to `requested` concealment packets at the tail.
    ///
    /// Headers and payload regions are staged past the committed area and
    /// exposed to the callback; the occupancy is only advanced after the
    /// callback returns, so the consumer cannot observe half-filled slots.
    /// Returns the number of elements synthesized.
    fn generate_concealment(
        &mut self,
        requested: usize,
        conceal: &mut dyn FnMut(&mut [ConcealmentSlot<'_>]),
    ) -> usize {
        let Some(last) = self.last_written_sequence_number else {
            return 0;
        };
        let packet_elements = self.shared.packet_elements;
        let slot_bytes = self.shared.slot_bytes(packet_elements);
        let payload_bytes = packet_elements * self.shared.element_size;

        let free = self.shared.capacity - self.shared.occupancy.load();
        let fit = free / slot_bytes;
        let to_conceal = requested.min(fit);
        if to_conceal < requested {
            log::warn!(
                "could not fit all missing packets, concealing {to_conceal}/{requested}"
            );
        }
        if to_conceal == 0 {
            return 0;
        }

        let base = self.shared.base();
        let capacity = self.shared.capacity;
        let mut staged = self.write.get();
        let mut previous = self.latest_written_elements;
        let mut slots = Vec::with_capacity(to_conceal);
        for index in 0..to_conceal {
            let sequence_number = last + 1 + index as u64;
            HeaderRef::at(base, staged).write(&HeaderFields {
                sequence_number,
                elements: packet_elements,
                previous_elements: previous,
                timestamp_ms: now_ms(),
                concealment: true,
            });
            previous = packet_elements;
            staged = (staged + HEADER_SIZE) % capacity;

            // SAFETY: the staged region is free space the producer owns
            // exclusively until the commit below publishes it; the double
            // mapping keeps the slice contiguous across the wrap.
            let data = unsafe { std::slice::from_raw_parts_mut(base.add(staged), payload_bytes) };
            slots.push(ConcealmentSlot {
                sequence_number,
                data,
            });
            staged = (staged + payload_bytes) % capacity;
        }

        conceal(&mut slots);
        drop(slots);

        // Publish everything at once now the payloads are filled.
        self.forward_write(to_conceal * slot_bytes);
        self.shared
            .written_elements
            .fetch_add(to_conceal * packet_elements, Ordering::Relaxed);
        self.last_written_sequence_number = Some(last + to_conceal as u64);
        self.latest_written_elements = packet_elements;
        to_conceal * packet_elements
    }

    /// Upgrade the concealment slot carrying `packet.sequence_number` with
    /// real payload data.
    ///
    /// Walks backward from the newest slot through the `previous_elements`
    /// chain. Mid-walk slots are stepped over under their `in_use` flag;
    /// the walk gives up when a flag is contended, when it would cross the
    /// `dont_walk_beyond` watermark, or when it runs out of occupied bytes.
    /// Returns the number of elements replaced (less than a full packet if
    /// the slot was partially drained already), or 0 when the upgrade could
    /// not happen.
    fn update(&mut self, packet: &Packet<'_>) -> usize {
        let element_size = self.shared.element_size;
        let base = self.shared.base();
        let capacity = self.shared.capacity;

        let mut remaining = self.shared.occupancy.load();
        let mut local = self.write.get();

        // The newest slot is one step behind the write cursor.
        let first = self.latest_written_elements * element_size + HEADER_SIZE;
        if first > remaining {
            log::warn!(
                "update {}: wanted to walk back {first} bytes but only {remaining} are written",
                packet.sequence_number
            );
            count(&self.shared.counters.update_missed_frames, packet.elements);
            return 0;
        }
        local = sub_mod(local, first, capacity);
        remaining -= first;

        loop {
            let header = HeaderRef::at(base, local);
            if header.sequence_number() == packet.sequence_number {
                break;
            }
            if !header.try_acquire() {
                log::warn!(
                    "update {}: slot {} is in use, stopping walk",
                    packet.sequence_number,
                    header.sequence_number()
                );
                return 0;
            }
            let watermark = self.shared.dont_walk_beyond.load(Ordering::Acquire);
            if watermark != WALK_UNRESTRICTED && header.sequence_number() <= watermark {
                header.release();
                log::warn!(
                    "update {}: slot {} is unwalkable",
                    packet.sequence_number,
                    header.sequence_number()
                );
                return 0;
            }
            let step = header.previous_elements() * element_size + HEADER_SIZE;
            if step > remaining {
                header.release();
                log::warn!(
                    "update {}: could not find target packet",
                    packet.sequence_number
                );
                count(&self.shared.counters.update_missed_frames, packet.elements);
                return 0;
            }
            local = sub_mod(local, step, capacity);
            remaining -= step;
            header.release();
        }

        let header = HeaderRef::at(base, local);
        if !header.concealment() {
            log::warn!(
                "update {}: target slot already holds real data",
                packet.sequence_number
            );
            return 0;
        }
        if !header.try_acquire() {
            log::warn!(
                "update {}: target slot is currently being read",
                packet.sequence_number
            );
            return 0;
        }

        let elements = header.elements();
        if elements > packet.elements
            || packet.data.len() != packet.elements * element_size
        {
            header.release();
            log::warn!(
                "update {}: payload shape mismatch (slot holds {elements}, packet carries {})",
                packet.sequence_number,
                packet.elements
            );
            return 0;
        }

        // A partially drained slot keeps only its tail; skip the prefix the
        // consumer already played out.
        let source_offset = (packet.elements - elements) * element_size;
        self.shared.copy_in(
            (local + HEADER_SIZE) % capacity,
            &packet.data[source_offset..source_offset + elements * element_size],
        );
        header.set_concealment(false);
        header.release();

        count(&self.shared.counters.updated_frames, elements);
        elements
    }
}
