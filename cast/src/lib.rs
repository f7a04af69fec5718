//! Cast - Real-Time Media Transport Receiver
//!
//! High-level Rust API for receive-side cast media transport: packet
//! reassembly, ack/NACK feedback, and playout scheduling.

pub use cast_protocol as protocol;
pub use cast_receiver as receiver;

// Re-export commonly used types
pub use protocol::{CastFeedback, EncodedFrame, FrameId, PacketHeader, PacketId};
pub use receiver::{FrameScheduler, ReceiverConfig};
