//! # jitterbuf
//!
//! A real-time jitter buffer for fixed-size media frames (typically audio).
//!
//! A single producer enqueues packets of sequence-numbered elements; a
//! single consumer dequeues elements smoothly. Between the two, the buffer:
//!
//! - absorbs arrival jitter behind a configurable minimum fill level with a
//!   one-way play gate,
//! - synthesizes placeholder ("concealment") packets for sequence gaps via
//!   a caller-supplied callback that writes straight into ring memory,
//! - lets late-arriving real packets upgrade their concealment slot in
//!   place,
//! - drops data that has aged past the configured maximum length.
//!
//! Storage is a byte ring mapped twice into adjacent virtual address
//! ranges, so every copy is one linear memcpy even across the wrap
//! boundary. Slots are header-delimited in-ring records; the producer and
//! consumer coordinate through an atomic byte occupancy and per-slot
//! `in_use` flags, with no locks and no allocation on the hot path.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::time::Duration;
//! use jitterbuf::{channel, JitterConfig, Packet};
//!
//! let (mut producer, mut consumer) = channel(JitterConfig {
//!     element_size: 4,      // one 16-bit stereo frame
//!     packet_elements: 480, // 10 ms packets
//!     clock_rate: 48_000,
//!     max_length: Duration::from_millis(500),
//!     min_length: Duration::from_millis(20),
//! })?;
//!
//! // Producer thread: push packets, filling gaps with silence.
//! let payload = vec![0u8; 480 * 4];
//! producer.enqueue(
//!     &[Packet { sequence_number: 1, data: &payload, elements: 480 }],
//!     |slots| {
//!         for slot in slots {
//!             slot.data.fill(0);
//!         }
//!     },
//! )?;
//!
//! // Consumer thread: pull elements as the sink drains.
//! let mut out = vec![0u8; 480 * 4];
//! let played = consumer.dequeue(&mut out, 480)?;
//! # let _ = played;
//! # Ok::<(), jitterbuf::JitterError>(())
//! ```
//!
//! Exactly one [`Producer`] and one [`Consumer`] exist per buffer; both are
//! `Send`, so each can live on its own thread. [`Producer::depth`],
//! [`Consumer::depth`] and the metrics snapshots may be taken from any
//! thread.

mod buffer;
mod config;
pub mod error;
mod metrics;
mod packet;
mod ring;

pub use buffer::{channel, Consumer, Producer};
pub use config::JitterConfig;
pub use error::{JitterError, JitterResult};
pub use metrics::Metrics;
pub use packet::{ConcealmentSlot, Packet};
