//! The jitter buffer: shared core and the producer/consumer handle pair.
//!
//! Construction returns two handles over one ring. The [`Producer`] owns
//! the write cursor and the sequence bookkeeping; the [`Consumer`] owns the
//! read cursor. Shared state is limited to the mapping itself, the atomic
//! occupancy, the element count, the play latch, the walk watermark and the
//! metrics counters.

pub(crate) mod consumer;
pub(crate) mod header;
pub(crate) mod producer;

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::JitterConfig;
use crate::error::JitterResult;
use crate::metrics::{Counters, Metrics};
use crate::ring::{Cursor, DoubleMapped, Occupancy};

pub use consumer::Consumer;
pub use producer::Producer;

use header::HEADER_SIZE;

/// Watermark value meaning "no unwalkable slot recorded".
pub(crate) const WALK_UNRESTRICTED: u64 = u64::MAX;

/// Create a jitter buffer, returning its producer and consumer handles.
///
/// Fails with [`InvalidArgument`](crate::JitterError::InvalidArgument) when
/// the configuration is rejected (zero `max_length`, packets shorter than
/// 1 ms) and with a memory error when the ring cannot be mapped.
///
/// ```no_run
/// use std::time::Duration;
/// use jitterbuf::{channel, JitterConfig, Packet};
///
/// let (mut producer, mut consumer) = channel(JitterConfig {
///     element_size: 4,
///     packet_elements: 480,
///     clock_rate: 48_000,
///     max_length: Duration::from_millis(500),
///     min_length: Duration::from_millis(20),
/// })?;
///
/// let payload = [0u8; 480 * 4];
/// producer.enqueue(
///     &[Packet { sequence_number: 1, data: &payload, elements: 480 }],
///     |slots| {
///         for slot in slots {
///             slot.data.fill(0);
///         }
///     },
/// )?;
///
/// let mut out = [0u8; 480 * 4];
/// let got = consumer.dequeue(&mut out, 480)?;
/// # let _ = got;
/// # Ok::<(), jitterbuf::JitterError>(())
/// ```
pub fn channel(config: JitterConfig) -> JitterResult<(Producer, Consumer)> {
    config.validate()?;

    let ring = DoubleMapped::new(config.ring_bytes(HEADER_SIZE))?;
    let capacity = ring.len();

    let shared = Arc::new(Shared {
        ring,
        capacity,
        element_size: config.element_size,
        packet_elements: config.packet_elements,
        clock_rate: config.clock_rate,
        max_length_ms: config.max_length.as_millis() as u64,
        min_length_ms: config.min_length.as_millis() as u64,
        occupancy: Occupancy::new(),
        written_elements: AtomicUsize::new(0),
        play: AtomicBool::new(false),
        dont_walk_beyond: AtomicU64::new(WALK_UNRESTRICTED),
        counters: Counters::default(),
    });

    log::debug!(
        "allocated jitter buffer: {} byte ring, {} byte elements, {} elements/packet",
        capacity,
        config.element_size,
        config.packet_elements
    );

    let producer = Producer {
        shared: Arc::clone(&shared),
        write: Cursor::new(capacity),
        last_written_sequence_number: None,
        latest_written_elements: 0,
    };
    let consumer = Consumer {
        shared,
        read: Cursor::new(capacity),
    };
    Ok((producer, consumer))
}

/// State visible to both handles.
pub(crate) struct Shared {
    pub ring: DoubleMapped,
    /// Ring length in bytes (page-rounded).
    pub capacity: usize,
    pub element_size: usize,
    pub packet_elements: usize,
    pub clock_rate: u32,
    pub max_length_ms: u64,
    pub min_length_ms: u64,
    pub occupancy: Occupancy,
    /// Sum of `elements` over all live slots.
    pub written_elements: AtomicUsize,
    /// One-way play latch: set by the producer, read by the consumer.
    pub play: AtomicBool,
    /// Walkers stop at slots with `sequence_number <= dont_walk_beyond`.
    pub dont_walk_beyond: AtomicU64,
    pub counters: Counters,
}

impl Shared {
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.ring.as_ptr()
    }

    /// Buffered media duration, truncated to whole milliseconds.
    pub fn depth_ms(&self) -> u64 {
        let elements = self.written_elements.load(Ordering::Relaxed) as u64;
        elements * 1000 / self.clock_rate as u64
    }

    pub fn depth(&self) -> Duration {
        Duration::from_millis(self.depth_ms())
    }

    pub fn metrics(&self) -> Metrics {
        self.counters.snapshot()
    }

    /// Copy `src` into the ring at `offset` (`offset < capacity`). Runs over
    /// the wrap boundary as a single linear copy thanks to the alias.
    pub fn copy_in(&self, offset: usize, src: &[u8]) {
        debug_assert!(offset < self.capacity);
        debug_assert!(src.len() <= self.capacity);
        // SAFETY: the destination range lies inside the 2x mapping; the
        // caller owns this region under the SPSC protocol (uncommitted
        // bytes, or a slot held via its in_use flag).
        unsafe {
            std::ptr::copy_nonoverlapping(src.as_ptr(), self.base().add(offset), src.len());
        }
    }

    /// Copy ring bytes at `offset` (`offset < capacity`) into `dst`.
    pub fn copy_out(&self, offset: usize, dst: &mut [u8]) {
        debug_assert!(offset < self.capacity);
        debug_assert!(dst.len() <= self.capacity);
        // SAFETY: the source range lies inside the 2x mapping and was
        // published to this party via the occupancy acquire.
        unsafe {
            std::ptr::copy_nonoverlapping(self.base().add(offset), dst.as_mut_ptr(), dst.len());
        }
    }

    /// Total bytes one slot of `elements` occupies.
    #[inline]
    pub fn slot_bytes(&self, elements: usize) -> usize {
        HEADER_SIZE + elements * self.element_size
    }
}

/// Milliseconds since the UNIX epoch.
#[inline]
pub(crate) fn now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(all(test, unix))]
mod tests {
    use std::time::Duration;

    use super::header::HEADER_SIZE;
    use super::*;
    use crate::packet::Packet;

    fn config() -> JitterConfig {
        JitterConfig {
            element_size: 4,
            packet_elements: 480,
            clock_rate: 48_000,
            max_length: Duration::from_millis(100),
            min_length: Duration::ZERO,
        }
    }

    fn packet_bytes(fill: u8) -> Vec<u8> {
        vec![fill; 480 * 4]
    }

    #[test]
    fn enqueue_lays_out_one_slot() {
        let (mut producer, consumer) = channel(config()).expect("construction failed");
        let data = packet_bytes(1);
        let enqueued = producer
            .enqueue(
                &[Packet {
                    sequence_number: 1,
                    data: &data,
                    elements: 480,
                }],
                |_| panic!("unexpected concealment"),
            )
            .expect("enqueue failed");
        assert_eq!(enqueued, 480);

        let expected = HEADER_SIZE + 480 * 4;
        assert_eq!(consumer.shared.occupancy.load(), expected);
        assert_eq!(producer.write.get(), expected);
        assert_eq!(consumer.read.get(), 0);

        // The payload sits directly after the header.
        let mut payload = vec![0u8; 480 * 4];
        consumer.shared.copy_out(HEADER_SIZE, &mut payload);
        assert_eq!(payload, data);
    }

    #[test]
    fn concealment_slots_are_laid_out_in_sequence_order() {
        let (mut producer, consumer) = channel(config()).expect("construction failed");
        let one = packet_bytes(1);
        producer
            .enqueue(
                &[Packet {
                    sequence_number: 1,
                    data: &one,
                    elements: 480,
                }],
                |_| panic!("unexpected concealment"),
            )
            .expect("enqueue failed");

        let four = packet_bytes(4);
        producer
            .enqueue(
                &[Packet {
                    sequence_number: 4,
                    data: &four,
                    elements: 480,
                }],
                |slots| {
                    for slot in slots.iter_mut() {
                        slot.data.fill(slot.sequence_number as u8);
                    }
                },
            )
            .expect("enqueue failed");

        // Ring now holds seqs 1, 2, 3, 4 back to back.
        let slot = HEADER_SIZE + 480 * 4;
        for (index, expected) in [1u8, 2, 3, 4].into_iter().enumerate() {
            let mut payload = vec![0u8; 480 * 4];
            consumer
                .shared
                .copy_out(index * slot + HEADER_SIZE, &mut payload);
            assert_eq!(payload, packet_bytes(expected), "slot {index}");
        }
        assert_eq!(consumer.shared.occupancy.load(), 4 * slot);
    }

    #[test]
    fn partial_read_rewrites_header_before_remaining_payload() {
        let (mut producer, mut consumer) = channel(config()).expect("construction failed");
        let data: Vec<u8> = (0..480 * 4).map(|i| (i % 251) as u8).collect();
        producer
            .enqueue(
                &[Packet {
                    sequence_number: 1,
                    data: &data,
                    elements: 480,
                }],
                |_| panic!("unexpected concealment"),
            )
            .expect("enqueue failed");

        let mut out = vec![0u8; 100 * 4];
        let got = consumer.dequeue(&mut out, 100).expect("dequeue failed");
        assert_eq!(got, 100);

        // The shrunk slot: header moved forward by the consumed bytes.
        let hdr = header::HeaderRef::at(consumer.shared.base(), consumer.read.get());
        assert_eq!(hdr.sequence_number(), 1);
        assert_eq!(hdr.elements(), 380);
        assert_eq!(
            consumer.shared.occupancy.load(),
            HEADER_SIZE + 380 * 4
        );
    }
}
