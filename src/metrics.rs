//! Metrics tracking for the jitter buffer.

use std::sync::atomic::{AtomicU64, Ordering};

/// Operational counters, updated from both sides of the buffer.
///
/// Counters are relaxed atomics; a snapshot is best-effort and not a
/// consistent cut across all five values.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    /// Elements synthesized to fill a sequence discontinuity.
    pub concealed_frames: AtomicU64,
    /// Elements synthesized to top the buffer up to the minimum depth.
    pub filled_packets: AtomicU64,
    /// Elements dropped at dequeue because they expired.
    pub skipped_frames: AtomicU64,
    /// Concealment elements upgraded to real data.
    pub updated_frames: AtomicU64,
    /// Elements of real packets that arrived too late to upgrade anything.
    pub update_missed_frames: AtomicU64,
}

impl Counters {
    pub fn snapshot(&self) -> Metrics {
        Metrics {
            concealed_frames: self.concealed_frames.load(Ordering::Relaxed),
            filled_packets: self.filled_packets.load(Ordering::Relaxed),
            skipped_frames: self.skipped_frames.load(Ordering::Relaxed),
            updated_frames: self.updated_frames.load(Ordering::Relaxed),
            update_missed_frames: self.update_missed_frames.load(Ordering::Relaxed),
        }
    }
}

/// Bump a counter by an element count.
pub(crate) fn count(counter: &AtomicU64, elements: usize) {
    counter.fetch_add(elements as u64, Ordering::Relaxed);
}

/// Non-atomic snapshot of buffer metrics (for external consumers).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Metrics {
    /// Number of elements concealed due to a discontinuity.
    pub concealed_frames: u64,
    /// Number of elements concealed to fill to minimum depth.
    pub filled_packets: u64,
    /// Number of elements skipped due to expiry.
    pub skipped_frames: u64,
    /// Number of concealment elements updated to real data.
    pub updated_frames: u64,
    /// Number of real elements that arrived too late to update concealment data.
    pub update_missed_frames: u64,
}
