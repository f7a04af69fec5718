//! Per-frame packet-completeness tracking

use crate::sequence::{FrameId, PacketId};
use std::collections::BTreeSet;

/// Result of recording one packet against the frame map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketOutcome {
    /// Packet belongs to a frame at or behind the release frontier
    TooOld,
    /// Packet was already recorded
    Duplicate,
    /// New packet; the frame is still incomplete
    NewPacket,
    /// New packet that made its frame complete
    NewPacketCompletingFrame,
}

/// Completeness state of one in-flight frame
///
/// Created on the first packet seen for a frame id. The identifier fields are
/// latched at creation; only the missing-packet set and the
/// highest-packet-seen watermark mutate afterwards.
pub struct FrameInfo {
    frame_id: FrameId,
    referenced_frame_id: FrameId,
    is_key_frame: bool,
    /// Highest packet id observed so far for this frame
    max_received_packet_id: PacketId,
    /// Packets not yet received, keyed by raw packet id; fully encodes the
    /// declared `0 ..= max_packet_id` range
    missing_packets: BTreeSet<u16>,
}

impl FrameInfo {
    /// Create tracking state for a newly seen frame
    ///
    /// The missing set starts as the full `{0 ..= max_packet_id}` range since
    /// the first packet's header declares the frame's total packet count.
    pub fn new(
        frame_id: FrameId,
        referenced_frame_id: FrameId,
        is_key_frame: bool,
        max_packet_id: PacketId,
    ) -> Self {
        FrameInfo {
            frame_id,
            referenced_frame_id,
            is_key_frame,
            max_received_packet_id: PacketId::new(0),
            missing_packets: (0..=max_packet_id.as_raw()).collect(),
        }
    }

    /// Record one packet
    pub fn insert_packet(&mut self, packet_id: PacketId) -> PacketOutcome {
        if !self.missing_packets.remove(&packet_id.as_raw()) {
            return PacketOutcome::Duplicate;
        }

        if packet_id.as_raw() > self.max_received_packet_id.as_raw() {
            self.max_received_packet_id = packet_id;
        }

        if self.missing_packets.is_empty() {
            PacketOutcome::NewPacketCompletingFrame
        } else {
            PacketOutcome::NewPacket
        }
    }

    /// A frame is complete iff its missing set is empty
    pub fn complete(&self) -> bool {
        self.missing_packets.is_empty()
    }

    /// Frame identifier
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Dependency frame identifier
    pub fn referenced_frame_id(&self) -> FrameId {
        self.referenced_frame_id
    }

    /// Whether this frame is a key frame
    pub fn is_key_frame(&self) -> bool {
        self.is_key_frame
    }

    /// Still-missing packet ids
    ///
    /// With `only_up_to_highest_seen`, the set is capped at the highest
    /// packet id actually observed for this frame. Used for the most recent
    /// frame only: there is no point NACKing packets the sender has not even
    /// numbered yet.
    pub fn missing_packets(&self, only_up_to_highest_seen: bool) -> BTreeSet<u16> {
        if only_up_to_highest_seen {
            self.missing_packets
                .iter()
                .copied()
                .filter(|&id| id <= self.max_received_packet_id.as_raw())
                .collect()
        } else {
            self.missing_packets.clone()
        }
    }
}
