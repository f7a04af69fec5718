//! Packet header model
//!
//! The wire format itself is parsed elsewhere; this module models the already
//! parsed per-packet header the reassembly core consumes, plus the validation
//! that keeps malformed headers from ever creating receiver state.

use crate::sequence::{FrameId, PacketId};
use std::fmt;
use thiserror::Error;

/// Media timestamp with 32-bit wraparound semantics
///
/// Expressed in ticks of the stream's RTP timebase (90 kHz for video).
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
pub struct RtpTimestamp(u32);

impl RtpTimestamp {
    /// Create a timestamp from its raw tick value
    #[inline]
    pub fn new(ticks: u32) -> Self {
        RtpTimestamp(ticks)
    }

    /// Get the raw tick value
    #[inline]
    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// Signed tick distance from this timestamp to another, accounting for
    /// wraparound
    #[inline]
    pub fn distance_to(self, other: RtpTimestamp) -> i64 {
        other.0.wrapping_sub(self.0) as i32 as i64
    }

    /// Signed microseconds from `earlier` to this timestamp at the given
    /// timebase (ticks per second)
    pub fn micros_since(self, earlier: RtpTimestamp, timebase: u32) -> i64 {
        debug_assert!(timebase > 0);
        earlier.distance_to(self) * 1_000_000 / timebase as i64
    }
}

impl fmt::Display for RtpTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Packet header errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    #[error("packet id {packet_id} exceeds declared max packet id {max_packet_id}")]
    PacketIdOutOfRange {
        packet_id: PacketId,
        max_packet_id: PacketId,
    },
}

/// Parsed header of one inbound media packet
///
/// The encoder declares a frame's total packet count in every packet it sends
/// for that frame (`max_packet_id`), so the receiver can size the
/// missing-packet set from the first packet it sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Frame this packet belongs to
    pub frame_id: FrameId,
    /// Position of this packet within the frame (0-based)
    pub packet_id: PacketId,
    /// Highest packet id of the frame
    pub max_packet_id: PacketId,
    /// Frame this frame depends on (equals `frame_id` for self-referencing
    /// frames)
    pub referenced_frame_id: FrameId,
    /// Whether the frame is decodable without any other frame's data
    pub is_key_frame: bool,
    /// Presentation timestamp of the frame
    pub rtp_timestamp: RtpTimestamp,
}

impl PacketHeader {
    /// Validate internal consistency
    ///
    /// Runs before the header reaches any stateful component; a malformed
    /// header is rejected without creating frame state.
    pub fn validate(&self) -> Result<(), PacketError> {
        // Packet ids count 0..=max within one frame, never wrapping, so a
        // plain ordering check is correct here.
        if self.packet_id.as_raw() > self.max_packet_id.as_raw() {
            return Err(PacketError::PacketIdOutOfRange {
                packet_id: self.packet_id,
                max_packet_id: self.max_packet_id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(packet_id: u16, max_packet_id: u16) -> PacketHeader {
        PacketHeader {
            frame_id: FrameId::new(0),
            packet_id: PacketId::new(packet_id),
            max_packet_id: PacketId::new(max_packet_id),
            referenced_frame_id: FrameId::new(0),
            is_key_frame: true,
            rtp_timestamp: RtpTimestamp::new(0),
        }
    }

    #[test]
    fn test_validate_ok() {
        assert!(header(0, 0).validate().is_ok());
        assert!(header(3, 3).validate().is_ok());
    }

    #[test]
    fn test_validate_packet_id_out_of_range() {
        let err = header(4, 3).validate().unwrap_err();
        assert_eq!(
            err,
            PacketError::PacketIdOutOfRange {
                packet_id: PacketId::new(4),
                max_packet_id: PacketId::new(3),
            }
        );
    }

    #[test]
    fn test_rtp_timestamp_distance_wraparound() {
        let a = RtpTimestamp::new(u32::MAX - 10);
        let b = RtpTimestamp::new(20);
        assert_eq!(a.distance_to(b), 31);
        assert_eq!(b.distance_to(a), -31);
    }

    #[test]
    fn test_rtp_timestamp_micros() {
        let a = RtpTimestamp::new(0);
        let b = RtpTimestamp::new(90_000); // one second at 90 kHz
        assert_eq!(b.micros_since(a, 90_000), 1_000_000);
        assert_eq!(a.micros_since(b, 90_000), -1_000_000);
    }
}
