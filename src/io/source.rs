//! Raw captured frames.

use bytes::Bytes;

/// Raw packet data from a capture reader.
#[derive(Clone, Debug)]
pub struct RawPacket {
    /// Frame number (1-indexed, matching Wireshark)
    pub frame_number: u64,
    /// Timestamp in microseconds since Unix epoch
    pub timestamp_us: i64,
    /// Captured length (may be less than original)
    pub captured_length: u32,
    /// Original packet length on the wire
    pub original_length: u32,
    /// Link layer type (e.g., 1 = Ethernet)
    pub link_type: u16,
    /// Frame bytes starting at the link-layer header
    pub data: Bytes,
}

impl RawPacket {
    /// Check if the packet was truncated during capture.
    pub fn is_truncated(&self) -> bool {
        self.captured_length < self.original_length
    }

    /// Timestamp as fractional seconds since the Unix epoch.
    pub fn timestamp_secs(&self) -> f64 {
        self.timestamp_us as f64 / 1_000_000.0
    }
}
