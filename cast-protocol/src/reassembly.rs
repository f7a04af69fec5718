//! Receive-side reassembly engine
//!
//! The component external code talks to: packets go in, completed frames come
//! out. Owns one [`FrameBuffer`] per in-flight frame, the [`FrameIdMap`] that
//! tracks completeness and the release frontier, and the
//! [`CastFeedbackBuilder`] that turns completions and gaps into ack/NACK
//! feedback.
//!
//! Single-threaded and non-blocking: every operation runs to completion on
//! the caller's task, and time is passed in explicitly.

use crate::feedback::{CastFeedbackBuilder, FeedbackConfig, FeedbackSink};
use crate::frame_buffer::{EncodedFrame, FrameBuffer};
use crate::frame_id_map::FrameIdMap;
use crate::frame_info::PacketOutcome;
use crate::packet::{PacketError, PacketHeader};
use crate::sequence::FrameId;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, trace};

/// Result of inserting one packet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketInsertion {
    /// The packet completed its frame
    pub completed_frame: bool,
    /// The packet had already been recorded (benign repeat, distinct from a
    /// stale too-old packet which reports neither flag)
    pub duplicate: bool,
}

/// A frame ready for the consumer, with release-policy context
#[derive(Debug, Clone)]
pub struct NextFrame {
    pub frame: EncodedFrame,
    /// Exactly the frontier successor, as opposed to a skip-ahead candidate
    pub is_consecutive: bool,
    /// Two or more complete decodable frames are waiting
    pub multiple_decodable: bool,
}

/// Packet-to-frame reassembly engine
pub struct ReassemblyEngine {
    decoder_faster_than_max_frame_rate: bool,
    /// Payload buffers keyed by raw frame id
    frames: BTreeMap<u8, FrameBuffer>,
    frame_id_map: FrameIdMap,
    feedback_builder: CastFeedbackBuilder,
}

impl ReassemblyEngine {
    pub fn new(config: FeedbackConfig, sink: Box<dyn FeedbackSink>) -> Self {
        ReassemblyEngine {
            decoder_faster_than_max_frame_rate: config.decoder_faster_than_max_frame_rate,
            frames: BTreeMap::new(),
            frame_id_map: FrameIdMap::new(),
            feedback_builder: CastFeedbackBuilder::new(config, sink),
        }
    }

    /// Record one packet and accumulate its payload
    ///
    /// A malformed header is rejected before creating any state. Too-old and
    /// duplicate packets are discarded; both leave the engine fully usable.
    /// Completing a frame notifies the feedback builder, which may emit.
    pub fn insert_packet(
        &mut self,
        payload: Bytes,
        header: &PacketHeader,
        now: Instant,
    ) -> Result<PacketInsertion, PacketError> {
        header.validate()?;

        match self.frame_id_map.insert_packet(header) {
            PacketOutcome::TooOld => {
                trace!(frame_id = %header.frame_id, packet_id = %header.packet_id, "too-old packet discarded");
                Ok(PacketInsertion {
                    completed_frame: false,
                    duplicate: false,
                })
            }
            PacketOutcome::Duplicate => {
                trace!(frame_id = %header.frame_id, packet_id = %header.packet_id, "duplicate packet discarded");
                Ok(PacketInsertion {
                    completed_frame: false,
                    duplicate: true,
                })
            }
            outcome => {
                self.frames
                    .entry(header.frame_id.as_raw())
                    .or_default()
                    .insert_packet(payload, header);

                let completed_frame = outcome == PacketOutcome::NewPacketCompletingFrame;
                if completed_frame {
                    self.feedback_builder.complete_frame_received(
                        header.frame_id,
                        &self.frame_id_map,
                        now,
                    );
                }
                Ok(PacketInsertion {
                    completed_frame,
                    duplicate: false,
                })
            }
        }
    }

    /// Next deliverable frame, if any
    ///
    /// The continuous successor of the frontier wins; only a decoder declared
    /// faster than the maximum frame rate may fall back to a skip-ahead
    /// candidate. Returns `None` while waiting for more data, which is the
    /// normal idle outcome rather than an error.
    pub fn next_frame(&self) -> Option<NextFrame> {
        let multiple_decodable = self.frame_id_map.have_multiple_decodable_frames();

        let (frame_id, is_consecutive) = match self.frame_id_map.next_continuous_frame() {
            Some(id) => (id, true),
            None if self.decoder_faster_than_max_frame_rate => (
                self.frame_id_map.next_frame_allowing_skipping_frames()?,
                false,
            ),
            None => return None,
        };

        let frame = self.frames.get(&frame_id.as_raw())?.assemble()?;
        Some(NextFrame {
            frame,
            is_consecutive,
            multiple_decodable,
        })
    }

    /// Accept `frame_id` for playout: advance the frontier and drop its
    /// buffer along with every older one still held
    ///
    /// Dropping older buffers means the ack frontier moved without a
    /// completion event, so the feedback message is rebuilt immediately.
    pub fn release_frame(&mut self, frame_id: FrameId, now: Instant) {
        self.frame_id_map.remove_old_frames(frame_id);
        self.frames.remove(&frame_id.as_raw());

        let before = self.frames.len();
        self.frames.retain(|&raw, _| FrameId::new(raw).gt(frame_id));
        if self.frames.len() != before {
            debug!(%frame_id, "release skipped over older frames, rebuilding feedback");
            self.feedback_builder.rebuild(&self.frame_id_map, now);
        }
    }

    /// Periodic feedback tick; emits at most once per configured interval
    pub fn update_cast_message(&mut self, now: Instant) {
        self.feedback_builder
            .update_cast_message(&self.frame_id_map, now);
    }

    /// Due time of the next periodic feedback message, `None` before the
    /// first packet
    pub fn time_to_send_next_cast_message(&self, now: Instant) -> Option<Instant> {
        self.feedback_builder
            .time_to_send_next_cast_message(&self.frame_id_map, now)
    }

    /// Drop all reassembly and feedback state
    ///
    /// The stream returns to waiting for a key frame; already-released frames
    /// are unaffected.
    pub fn reset(&mut self) {
        debug!("reassembly engine reset");
        self.frames.clear();
        self.frame_id_map.clear();
        self.feedback_builder.reset();
    }

    /// Release frontier of the underlying frame map
    pub fn last_released_frame(&self) -> FrameId {
        self.frame_id_map.last_released_frame()
    }
}
