//! Clock-drift smoothing seam
//!
//! The sender's media clock and the receiver's monotonic clock drift apart
//! over time; a smoother turns per-packet offset samples into a stable
//! correction applied to playout times. The smoothing math itself is an
//! external collaborator; this module only defines its interface.

use std::time::Instant;

/// Smoothed sender/receiver clock offset
pub trait DriftSmoother {
    /// Feed one raw offset sample, in microseconds, measured at `now`
    fn observe(&mut self, now: Instant, offset_micros: i64);

    /// Current smoothed offset in microseconds, applied to playout times
    fn current_offset_micros(&self) -> i64;
}

/// Smoother that applies no correction
#[derive(Debug, Default, Clone, Copy)]
pub struct NullDriftSmoother;

impl DriftSmoother for NullDriftSmoother {
    fn observe(&mut self, _now: Instant, _offset_micros: i64) {}

    fn current_offset_micros(&self) -> i64 {
        0
    }
}
