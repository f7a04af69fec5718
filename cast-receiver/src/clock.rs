//! Monotonic clock seam
//!
//! Time enters the receiver only through this trait so the scheduler and the
//! feedback timers are fully deterministic under test.

use std::time::Instant;

/// Monotonic time source
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Clock backed by [`Instant::now`]
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}
