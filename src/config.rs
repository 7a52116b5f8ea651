//! Buffer construction parameters.

use std::time::Duration;

use crate::error::{JitterError, JitterResult};

/// Construction parameters for a jitter buffer.
///
/// `element_size` is the atomic payload unit in bytes (e.g. one audio frame),
/// `packet_elements` the number of elements every incoming packet carries,
/// and `clock_rate` the element rate in Hz (48 kHz audio is 48000).
///
/// `max_length` bounds both the ring capacity and the age at which buffered
/// data expires; `min_length` is the fill level playback tries to maintain.
#[derive(Debug, Clone)]
pub struct JitterConfig {
    /// Size of held elements in bytes.
    pub element_size: usize,
    /// Number of elements in each incoming packet.
    pub packet_elements: usize,
    /// Clock rate of the contained elements in Hz.
    pub clock_rate: u32,
    /// Maximum buffered duration; also the expiry age.
    pub max_length: Duration,
    /// Minimum buffered duration to maintain while playing.
    pub min_length: Duration,
}

impl JitterConfig {
    pub(crate) fn validate(&self) -> JitterResult<()> {
        if self.element_size == 0 {
            return Err(JitterError::invalid_argument("element size must be > 0"));
        }
        if self.packet_elements == 0 {
            return Err(JitterError::invalid_argument("packet elements must be > 0"));
        }
        if self.clock_rate == 0 {
            return Err(JitterError::invalid_argument("clock rate must be > 0"));
        }
        if self.max_length.as_millis() == 0 {
            return Err(JitterError::invalid_argument("max length must be > 0"));
        }
        if self.packet_duration_ms() < 1 {
            return Err(JitterError::invalid_argument(
                "packets should be at least 1ms",
            ));
        }
        Ok(())
    }

    /// Duration of one packet in whole milliseconds (truncating).
    pub(crate) fn packet_duration_ms(&self) -> u64 {
        self.packet_elements as u64 * 1000 / self.clock_rate as u64
    }

    /// Ring capacity in bytes before page rounding: enough slots to hold
    /// `max_length` of elements, headers included.
    pub(crate) fn ring_bytes(&self, header_size: usize) -> usize {
        self.max_length.as_millis() as usize
            * (self.clock_rate / 1000) as usize
            * (self.element_size + header_size)
    }
}
