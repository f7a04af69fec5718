//! Cast Receiver
//!
//! Receive-side session layer on top of [`cast_protocol`]: playout-time
//! scheduling of reassembled frames, lip-sync and clock-drift tracking,
//! payload decryption seams, and configuration. Network I/O stays with the
//! embedding application; packets are handed in and frames are handed out
//! through callbacks.

pub mod clock;
pub mod config;
pub mod decrypt;
pub mod drift;
pub mod scheduler;

pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, ReceiverConfig};
pub use decrypt::{DecryptError, FrameDecryptor};
pub use drift::{DriftSmoother, NullDriftSmoother};
pub use scheduler::{FrameScheduler, ReadyFrame};
