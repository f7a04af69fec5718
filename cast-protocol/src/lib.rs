//! Cast Protocol Core Implementation
//!
//! This crate implements the receive side of a cast-style real-time media
//! transport: wraparound-safe frame/packet identifiers, per-frame
//! completeness tracking, frame buffering and assembly, ack/NACK feedback
//! construction with backlog throttling, and the reassembly engine that ties
//! them together. Transport I/O, wire codecs, and payload ciphers live
//! outside this crate.

pub mod feedback;
pub mod frame_buffer;
pub mod frame_id_map;
pub mod frame_info;
pub mod packet;
pub mod reassembly;
pub mod sequence;

pub use feedback::{
    CastFeedback, CastFeedbackBuilder, FeedbackConfig, FeedbackSink, FrameLoss, NullFeedbackSink,
};
pub use frame_buffer::{EncodedFrame, FrameBuffer, FrameDependency};
pub use frame_id_map::FrameIdMap;
pub use frame_info::{FrameInfo, PacketOutcome};
pub use packet::{PacketError, PacketHeader, RtpTimestamp};
pub use reassembly::{NextFrame, PacketInsertion, ReassemblyEngine};
pub use sequence::{FrameId, PacketId};
