//! Per-frame payload accumulation and assembly
//!
//! A [`FrameBuffer`] collects the payload bytes of one frame's packets in any
//! arrival order and assembles the final contiguous frame payload in
//! ascending packet-id order once every packet is present.

use crate::packet::{PacketHeader, RtpTimestamp};
use crate::sequence::{FrameId, PacketId};
use bytes::{Bytes, BytesMut};
use std::collections::BTreeMap;

/// How a frame relates to other frames for decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDependency {
    /// Decodable without any other frame's data
    Key,
    /// Non-key frame that references itself
    Independent,
    /// References another frame
    Dependent,
}

/// One fully assembled, decodable unit of media
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub frame_id: FrameId,
    pub dependency: FrameDependency,
    pub referenced_frame_id: FrameId,
    pub rtp_timestamp: RtpTimestamp,
    pub payload: Bytes,
}

/// Accumulates the packets of one frame
///
/// Identity and metadata are latched from the first packet inserted; packets
/// carrying a different frame id afterwards are ignored, as are duplicate
/// packet ids.
pub struct FrameBuffer {
    frame_id: FrameId,
    max_packet_id: PacketId,
    is_key_frame: bool,
    referenced_frame_id: FrameId,
    rtp_timestamp: RtpTimestamp,
    total_data_size: usize,
    /// Payloads ordered by raw packet id
    packets: BTreeMap<u16, Bytes>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        FrameBuffer {
            frame_id: FrameId::new(0),
            max_packet_id: PacketId::new(0),
            is_key_frame: false,
            referenced_frame_id: FrameId::new(0),
            rtp_timestamp: RtpTimestamp::new(0),
            total_data_size: 0,
            packets: BTreeMap::new(),
        }
    }

    /// Store one packet's payload
    ///
    /// Returns whether the packet was stored. Mismatched frame ids and
    /// duplicate packet ids are ignored; insertion is idempotent.
    pub fn insert_packet(&mut self, payload: Bytes, header: &PacketHeader) -> bool {
        if self.packets.is_empty() {
            self.frame_id = header.frame_id;
            self.max_packet_id = header.max_packet_id;
            self.is_key_frame = header.is_key_frame;
            self.referenced_frame_id = header.referenced_frame_id;
            self.rtp_timestamp = header.rtp_timestamp;
        } else if header.frame_id != self.frame_id {
            // Caller routes by frame id, so this should not happen
            return false;
        }

        if self.packets.contains_key(&header.packet_id.as_raw()) {
            return false;
        }

        self.total_data_size += payload.len();
        self.packets.insert(header.packet_id.as_raw(), payload);
        true
    }

    /// Number of distinct packets received equals the declared packet count
    pub fn complete(&self) -> bool {
        !self.packets.is_empty() && self.packets.len() == self.max_packet_id.as_raw() as usize + 1
    }

    /// Concatenate payloads ascending by packet id into the final frame
    ///
    /// Fails while the buffer is incomplete.
    pub fn assemble(&self) -> Option<EncodedFrame> {
        if !self.complete() {
            return None;
        }

        let mut payload = BytesMut::with_capacity(self.total_data_size);
        for fragment in self.packets.values() {
            payload.extend_from_slice(fragment);
        }

        let dependency = if self.is_key_frame {
            FrameDependency::Key
        } else if self.referenced_frame_id == self.frame_id {
            FrameDependency::Independent
        } else {
            FrameDependency::Dependent
        };

        Some(EncodedFrame {
            frame_id: self.frame_id,
            dependency,
            referenced_frame_id: self.referenced_frame_id,
            rtp_timestamp: self.rtp_timestamp,
            payload: payload.freeze(),
        })
    }

    /// Frame id latched from the first packet
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Total payload bytes accumulated so far
    pub fn total_data_size(&self) -> usize {
        self.total_data_size
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}
