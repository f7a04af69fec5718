//! Payload decryption seam
//!
//! Frames may arrive encrypted; the cipher itself is an external
//! collaborator behind this trait. A decryption failure drops the frame but
//! never the stream.

use bytes::Bytes;
use cast_protocol::FrameId;
use thiserror::Error;

/// Decryption errors
#[derive(Error, Debug, Clone)]
pub enum DecryptError {
    #[error("decryption failed for frame {0}: {1}")]
    Failed(FrameId, String),
}

/// Decrypts one frame's assembled payload
pub trait FrameDecryptor {
    fn decrypt(&mut self, frame_id: FrameId, ciphertext: &[u8]) -> Result<Bytes, DecryptError>;
}
