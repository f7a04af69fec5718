//! Configuration file support for the cast receiver

use cast_protocol::FeedbackConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Receiver configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiverConfig {
    /// Whether the decoder is faster than the stream's maximum frame rate;
    /// enables skip-ahead delivery and disables slow-ack throttling
    #[serde(default)]
    pub decoder_faster_than_max_frame_rate: bool,
    /// Complete-but-unreleased frame count above which acks are throttled
    #[serde(default = "default_max_unacked_frames")]
    pub max_unacked_frames: usize,
    /// Minimum interval before re-NACKing the same frame, in milliseconds
    #[serde(default = "default_nack_repeat_interval")]
    pub nack_repeat_interval_ms: u64,
    /// Minimum interval between periodic feedback messages, in milliseconds
    #[serde(default = "default_cast_message_interval")]
    pub cast_message_interval_ms: u64,
    /// End-to-end playout delay budget, in milliseconds
    #[serde(default = "default_target_playout_delay")]
    pub target_playout_delay_ms: u64,
    /// Maximum frame rate of the stream (frames per second)
    #[serde(default = "default_max_frame_rate")]
    pub max_frame_rate: u32,
    /// Media timestamp ticks per second
    #[serde(default = "default_rtp_timebase")]
    pub rtp_timebase: u32,
}

fn default_max_unacked_frames() -> usize {
    120
}

fn default_nack_repeat_interval() -> u64 {
    30
}

fn default_cast_message_interval() -> u64 {
    33
}

fn default_target_playout_delay() -> u64 {
    400
}

fn default_max_frame_rate() -> u32 {
    30
}

fn default_rtp_timebase() -> u32 {
    90_000
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        ReceiverConfig {
            decoder_faster_than_max_frame_rate: false,
            max_unacked_frames: default_max_unacked_frames(),
            nack_repeat_interval_ms: default_nack_repeat_interval(),
            cast_message_interval_ms: default_cast_message_interval(),
            target_playout_delay_ms: default_target_playout_delay(),
            max_frame_rate: default_max_frame_rate(),
            rtp_timebase: default_rtp_timebase(),
        }
    }
}

impl ReceiverConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config: ReceiverConfig = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }

    /// Check value ranges
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_frame_rate == 0 {
            return Err(ConfigError::Invalid("max_frame_rate must be > 0".into()));
        }
        if self.rtp_timebase == 0 {
            return Err(ConfigError::Invalid("rtp_timebase must be > 0".into()));
        }
        Ok(())
    }

    /// Feedback builder tuning derived from this configuration
    pub fn feedback(&self) -> FeedbackConfig {
        FeedbackConfig {
            decoder_faster_than_max_frame_rate: self.decoder_faster_than_max_frame_rate,
            max_unacked_frames: self.max_unacked_frames,
            nack_repeat_interval: Duration::from_millis(self.nack_repeat_interval_ms),
            cast_message_interval: Duration::from_millis(self.cast_message_interval_ms),
        }
    }

    /// Playout delay budget as a Duration
    pub fn target_playout_delay(&self) -> Duration {
        Duration::from_millis(self.target_playout_delay_ms)
    }

    /// Duration of one frame at the maximum frame rate
    pub fn expected_frame_duration(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.max_frame_rate as u64)
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
