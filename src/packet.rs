//! Packet records exchanged with the buffer.

/// A batch of fixed-size elements carrying one monotonic sequence number.
///
/// `data.len()` must equal `elements * element_size` for the buffer the
/// packet is enqueued into. Sequence numbers are 64-bit and must increase
/// monotonically; wraparound is not modelled.
#[derive(Debug, Clone, Copy)]
pub struct Packet<'a> {
    /// Producer-assigned monotonic id.
    pub sequence_number: u64,
    /// Payload bytes.
    pub data: &'a [u8],
    /// Number of elements in `data`.
    pub elements: usize,
}

/// A writable in-ring payload region handed to the concealment callback.
///
/// The callback must fill `data` completely. The region is only valid for
/// the duration of the callback; it must not be retained, and the callback
/// must not call back into the buffer.
#[derive(Debug)]
pub struct ConcealmentSlot<'a> {
    /// The sequence number the synthesized packet will carry.
    pub sequence_number: u64,
    /// In-ring payload region of exactly one packet.
    pub data: &'a mut [u8],
}
