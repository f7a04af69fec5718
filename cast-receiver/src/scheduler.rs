//! Playout-time-driven frame delivery
//!
//! Sits above the reassembly engine and turns "frame is complete" into
//! "frame is handed to the consumer at the right moment". Consumers enqueue
//! frame requests; the scheduler fulfills them in playout order, skipping a
//! stale frame when a fresher one is ready and waiting for a missing
//! predecessor while it can still arrive in time.
//!
//! Everything runs on the caller's task. Waiting is never blocking: a
//! deferred decision is represented as a wake-up time the caller re-arms.

use crate::clock::Clock;
use crate::config::ReceiverConfig;
use crate::decrypt::FrameDecryptor;
use crate::drift::DriftSmoother;
use bytes::Bytes;
use cast_protocol::{
    EncodedFrame, FeedbackSink, PacketError, PacketHeader, PacketInsertion, ReassemblyEngine,
    RtpTimestamp,
};
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// A frame delivered to the consumer
#[derive(Debug, Clone)]
pub struct ReadyFrame {
    pub frame: EncodedFrame,
    /// When the frame should be presented
    pub playout_time: Instant,
}

type FrameCallback = Box<dyn FnOnce(Option<ReadyFrame>)>;

/// Shift an instant by a signed microsecond offset
fn add_signed_micros(base: Instant, micros: i64) -> Instant {
    if micros >= 0 {
        base + Duration::from_micros(micros as u64)
    } else {
        base.checked_sub(Duration::from_micros(micros.unsigned_abs()))
            .unwrap_or(base)
    }
}

/// Signed microseconds from `earlier` to `later`
fn signed_micros_between(later: Instant, earlier: Instant) -> i64 {
    if later >= earlier {
        later.duration_since(earlier).as_micros() as i64
    } else {
        -(earlier.duration_since(later).as_micros() as i64)
    }
}

/// Frame-release scheduler
pub struct FrameScheduler {
    engine: ReassemblyEngine,
    clock: Box<dyn Clock>,
    drift: Box<dyn DriftSmoother>,
    decryptor: Option<Box<dyn FrameDecryptor>>,
    target_playout_delay: Duration,
    expected_frame_duration: Duration,
    rtp_timebase: u32,
    /// Pending consumer requests, fulfilled oldest first
    requests: VecDeque<FrameCallback>,
    /// Media-to-wall-clock anchor from the first packet seen
    lip_sync_reference: Option<(RtpTimestamp, Instant)>,
    /// Set while delivery is deferred waiting for a missing predecessor
    deferred_wake: Option<Instant>,
}

impl FrameScheduler {
    pub fn new(
        config: &ReceiverConfig,
        sink: Box<dyn FeedbackSink>,
        clock: Box<dyn Clock>,
        drift: Box<dyn DriftSmoother>,
        decryptor: Option<Box<dyn FrameDecryptor>>,
    ) -> Self {
        FrameScheduler {
            engine: ReassemblyEngine::new(config.feedback(), sink),
            clock,
            drift,
            decryptor,
            target_playout_delay: config.target_playout_delay(),
            expected_frame_duration: config.expected_frame_duration(),
            rtp_timebase: config.rtp_timebase,
            requests: VecDeque::new(),
            lip_sync_reference: None,
            deferred_wake: None,
        }
    }

    /// Feed one inbound packet
    ///
    /// Updates lip-sync/drift tracking and attempts delivery if the packet
    /// completed a frame.
    pub fn insert_packet(
        &mut self,
        payload: Bytes,
        header: &PacketHeader,
    ) -> Result<PacketInsertion, PacketError> {
        let now = self.clock.now();
        let insertion = self.engine.insert_packet(payload, header, now)?;

        self.update_lip_sync(header.rtp_timestamp, now);

        if insertion.completed_frame {
            self.process_ready_frames(now);
        }
        Ok(insertion)
    }

    /// Enqueue a request for the next frame
    ///
    /// The callback fires exactly once: with a frame when one becomes
    /// deliverable, or with `None` if the scheduler is torn down first.
    pub fn request_frame(&mut self, callback: impl FnOnce(Option<ReadyFrame>) + 'static) {
        self.requests.push_back(Box::new(callback));
        let now = self.clock.now();
        self.process_ready_frames(now);
    }

    /// Service expired timers; returns the next wake-up time, if any
    ///
    /// Drives the deferred-delivery wait and the periodic feedback message;
    /// both re-arm after firing.
    pub fn tick(&mut self) -> Option<Instant> {
        let now = self.clock.now();

        if let Some(wake) = self.deferred_wake {
            if now >= wake {
                self.deferred_wake = None;
                self.process_ready_frames(now);
            }
        }

        self.engine.update_cast_message(now);
        self.next_wake_time(now)
    }

    /// Earliest of the deferred-delivery wake and the periodic feedback due
    /// time
    pub fn next_wake_time(&self, now: Instant) -> Option<Instant> {
        let feedback_due = self.engine.time_to_send_next_cast_message(now);
        match (self.deferred_wake, feedback_due) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (Some(a), None) => Some(a),
            (None, due) => due,
        }
    }

    /// Restart the stream state after an error requiring a fresh key frame
    ///
    /// Pending requests stay queued; frames already delivered stay delivered.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.deferred_wake = None;
    }

    /// Number of unfulfilled frame requests
    pub fn pending_requests(&self) -> usize {
        self.requests.len()
    }

    fn update_lip_sync(&mut self, rtp_timestamp: RtpTimestamp, now: Instant) {
        match self.lip_sync_reference {
            None => self.lip_sync_reference = Some((rtp_timestamp, now)),
            Some((reference_ts, reference_time)) => {
                let media_micros = rtp_timestamp.micros_since(reference_ts, self.rtp_timebase);
                let expected_arrival = add_signed_micros(reference_time, media_micros);
                self.drift
                    .observe(now, signed_micros_between(now, expected_arrival));
            }
        }
    }

    /// Presentation time for a frame timestamp: lip-sync anchor plus media
    /// delta plus smoothed drift plus the playout delay budget
    fn playout_time(&self, rtp_timestamp: RtpTimestamp, now: Instant) -> Instant {
        let Some((reference_ts, reference_time)) = self.lip_sync_reference else {
            return now + self.target_playout_delay;
        };
        let media_micros = rtp_timestamp.micros_since(reference_ts, self.rtp_timebase);
        let base = add_signed_micros(
            reference_time,
            media_micros + self.drift.current_offset_micros(),
        );
        base + self.target_playout_delay
    }

    /// Fulfill as many requests as ready frames allow
    fn process_ready_frames(&mut self, now: Instant) {
        while !self.requests.is_empty() {
            let Some(next) = self.engine.next_frame() else {
                return;
            };
            let frame_id = next.frame.frame_id;
            let playout_time = self.playout_time(next.frame.rtp_timestamp, now);

            // Catch-up: never deliver a frame whose window already closed
            // when a later one is ready
            if next.multiple_decodable && playout_time <= now {
                debug!(%frame_id, "playout window closed, skipping frame");
                self.engine.release_frame(frame_id, now);
                continue;
            }

            // A skip-ahead candidate may be premature: if the missing
            // predecessor could still complete before this frame's playout
            // time, wait for it instead of skipping
            if !next.is_consecutive {
                let earliest_completion = now + self.expected_frame_duration;
                if earliest_completion < playout_time {
                    if self.deferred_wake.is_none() {
                        debug!(%frame_id, "deferring skip-ahead, predecessor may still arrive");
                        self.deferred_wake = Some(playout_time);
                    }
                    return;
                }
            }

            let frame = match self.decrypt_frame(next.frame) {
                Some(frame) => frame,
                None => {
                    self.engine.release_frame(frame_id, now);
                    continue;
                }
            };

            self.engine.release_frame(frame_id, now);
            self.deferred_wake = None;

            let Some(callback) = self.requests.pop_front() else {
                return;
            };
            callback(Some(ReadyFrame {
                frame,
                playout_time,
            }));
        }
    }

    fn decrypt_frame(&mut self, mut frame: EncodedFrame) -> Option<EncodedFrame> {
        let Some(decryptor) = self.decryptor.as_mut() else {
            return Some(frame);
        };
        match decryptor.decrypt(frame.frame_id, &frame.payload) {
            Ok(plaintext) => {
                frame.payload = plaintext;
                Some(frame)
            }
            Err(err) => {
                warn!(frame_id = %frame.frame_id, %err, "dropping undecryptable frame");
                None
            }
        }
    }
}

impl Drop for FrameScheduler {
    /// Pending callbacks still fire, signaling "unsatisfied"
    fn drop(&mut self) {
        for callback in self.requests.drain(..) {
            callback(None);
        }
    }
}
