//! ACK/NACK feedback construction
//!
//! Derives the receiver's feedback message (one cumulative ack frame id plus
//! a sparse missing-frame/missing-packet report) from [`FrameIdMap`] state.
//! The builder throttles acknowledgements when the consumer falls behind
//! (slow-ack), rate-limits repeated NACKs per frame, and gates the periodic
//! feedback message on a minimum interval.
//!
//! Serializing the message onto the wire is the transport's concern; the
//! builder hands the finished [`CastFeedback`] to a [`FeedbackSink`].

use crate::frame_id_map::FrameIdMap;
use crate::sequence::FrameId;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// What is missing from one un-acked frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameLoss {
    /// No packet of the frame has arrived
    EntireFrame,
    /// Specific packet ids still outstanding
    Packets(BTreeSet<u16>),
}

/// Feedback message sent back to the sender
///
/// Everything at or before `ack_frame_id` is fully received and accepted;
/// `missing` reports losses for frames strictly newer than it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CastFeedback {
    pub ack_frame_id: FrameId,
    /// Losses keyed by raw frame id
    pub missing: BTreeMap<u8, FrameLoss>,
}

impl CastFeedback {
    pub fn new() -> Self {
        CastFeedback {
            ack_frame_id: FrameId::START,
            missing: BTreeMap::new(),
        }
    }
}

impl Default for CastFeedback {
    fn default() -> Self {
        Self::new()
    }
}

/// Transmits finished feedback messages over the network
pub trait FeedbackSink {
    fn send_feedback(&mut self, feedback: &CastFeedback);
}

/// Sink that discards every message; for tests and feedback-less operation
#[derive(Debug, Default, Clone, Copy)]
pub struct NullFeedbackSink;

impl FeedbackSink for NullFeedbackSink {
    fn send_feedback(&mut self, _feedback: &CastFeedback) {}
}

/// Feedback builder tuning
#[derive(Debug, Clone)]
pub struct FeedbackConfig {
    /// Whether the decoder is declared faster than the stream's maximum
    /// frame rate; disables slow-ack throttling
    pub decoder_faster_than_max_frame_rate: bool,
    /// Complete-but-unreleased frame count above which acks are throttled
    pub max_unacked_frames: usize,
    /// Minimum interval before re-NACKing the same frame
    pub nack_repeat_interval: Duration,
    /// Minimum interval between periodic feedback messages
    pub cast_message_interval: Duration,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        FeedbackConfig {
            decoder_faster_than_max_frame_rate: false,
            max_unacked_frames: 120,
            nack_repeat_interval: Duration::from_millis(30),
            cast_message_interval: Duration::from_millis(33),
        }
    }
}

/// Ack/NACK state machine
///
/// Holds no reference into the frame map; the owning engine passes it in for
/// each query, read-only.
pub struct CastFeedbackBuilder {
    config: FeedbackConfig,
    sink: Box<dyn FeedbackSink>,
    feedback: CastFeedback,
    last_update_time: Option<Instant>,
    /// Slow-ack state: while set, only every other frontier candidate is
    /// acknowledged so the acked id deliberately trails completion
    slowing_down_ack: bool,
    acked_last_candidate: bool,
    ack_queue: VecDeque<FrameId>,
    /// Last NACK emission per frame, keyed by raw frame id
    time_last_nacked: BTreeMap<u8, Instant>,
}

impl CastFeedbackBuilder {
    pub fn new(config: FeedbackConfig, sink: Box<dyn FeedbackSink>) -> Self {
        CastFeedbackBuilder {
            config,
            sink,
            feedback: CastFeedback::new(),
            last_update_time: None,
            slowing_down_ack: false,
            acked_last_candidate: true,
            ack_queue: VecDeque::new(),
            time_last_nacked: BTreeMap::new(),
        }
    }

    /// Notification that `frame_id` just became complete
    ///
    /// Emits a feedback message iff the cumulative ack actually advanced.
    pub fn complete_frame_received(&mut self, frame_id: FrameId, map: &FrameIdMap, now: Instant) {
        if self.last_update_time.is_none() {
            self.last_update_time = Some(now);
        }
        if !self.update_ack_message(map) {
            trace!(%frame_id, "frame complete, ack unchanged");
            return;
        }
        self.build_packet_list(map, now);
        self.sink.send_feedback(&self.feedback);
    }

    /// Idempotent periodic tick
    ///
    /// Emits only when the minimum inter-message interval has elapsed.
    pub fn update_cast_message(&mut self, map: &FrameIdMap, now: Instant) {
        let Some(last_update) = self.last_update_time else {
            if map.has_received_packets() {
                self.last_update_time = Some(now);
            }
            return;
        };

        if now.duration_since(last_update) < self.config.cast_message_interval {
            return;
        }
        self.last_update_time = Some(now);

        self.update_ack_message(map);
        self.build_packet_list(map, now);
        self.sink.send_feedback(&self.feedback);
    }

    /// Unconditional rebuild and emit
    ///
    /// Used when the ack frontier moved without a completion event (frames
    /// dropped at release time); bypasses the periodic interval gate.
    pub fn rebuild(&mut self, map: &FrameIdMap, now: Instant) {
        self.last_update_time = Some(now);
        self.update_ack_message(map);
        self.build_packet_list(map, now);
        self.sink.send_feedback(&self.feedback);
    }

    /// Due time of the next periodic feedback message
    ///
    /// `None` until any packet has been seen.
    pub fn time_to_send_next_cast_message(
        &self,
        map: &FrameIdMap,
        now: Instant,
    ) -> Option<Instant> {
        if self.last_update_time.is_none() && !map.has_received_packets() {
            return None;
        }
        Some(
            self.last_update_time
                .map_or(now, |last| last + self.config.cast_message_interval),
        )
    }

    /// Clear ack state and NACK timers back to stream start
    pub fn reset(&mut self) {
        self.feedback = CastFeedback::new();
        self.time_last_nacked.clear();
        self.ack_queue.clear();
        self.slowing_down_ack = false;
        self.acked_last_candidate = true;
    }

    /// Advance the cumulative ack; returns whether it changed
    fn update_ack_message(&mut self, map: &FrameIdMap) -> bool {
        if !self.config.decoder_faster_than_max_frame_rate {
            // The drained check must win over the backlog check: with a
            // threshold of zero a count of one satisfies both.
            let complete_count = map.number_of_complete_frames();
            if complete_count <= 1 {
                if self.slowing_down_ack {
                    debug!("leaving slow-ack");
                    self.ack_queue.clear();
                    self.acked_last_candidate = true;
                }
                self.slowing_down_ack = false;
            } else if complete_count > self.config.max_unacked_frames {
                if !self.slowing_down_ack {
                    debug!(complete_count, "entering slow-ack");
                }
                self.slowing_down_ack = true;
            }
        }

        let mut candidate = map.last_continuous_frame();

        if self.slowing_down_ack {
            // Queue-and-alternate: each new frontier candidate is queued and
            // only every second one pops the oldest queued candidate, so the
            // acked id trails the true completion point.
            if self.ack_queue.back() == Some(&candidate) {
                return false;
            }
            self.ack_queue.push_back(candidate);
            self.acked_last_candidate = !self.acked_last_candidate;
            if !self.acked_last_candidate {
                return false;
            }
            match self.ack_queue.pop_front() {
                Some(queued) => candidate = queued,
                None => return false,
            }
        }

        if candidate == self.feedback.ack_frame_id {
            return false;
        }
        self.feedback.ack_frame_id = candidate;
        true
    }

    /// Rebuild the missing-frame report for every id strictly after the ack
    /// up to the newest frame seen
    fn build_packet_list(&mut self, map: &FrameIdMap, now: Instant) {
        self.feedback.missing.clear();

        let Some(newest) = map.newest_frame_id() else {
            return;
        };

        let ack = self.feedback.ack_frame_id;
        self.time_last_nacked
            .retain(|&raw, _| FrameId::new(raw).gt(ack));

        let mut next = ack.next();
        while next.le(newest) {
            let frame_id = next;
            next = next + 1;

            // Don't re-NACK a frame we reported very recently
            if let Some(&last) = self.time_last_nacked.get(&frame_id.as_raw()) {
                if now.duration_since(last) < self.config.nack_repeat_interval {
                    continue;
                }
            }

            if !map.frame_exists(frame_id) {
                self.feedback
                    .missing
                    .insert(frame_id.as_raw(), FrameLoss::EntireFrame);
                self.time_last_nacked.insert(frame_id.as_raw(), now);
                continue;
            }

            // Cap the missing set at the highest packet seen for the newest
            // frame only
            let missing = map
                .missing_packets(frame_id, frame_id == newest)
                .unwrap_or_default();
            if !missing.is_empty() {
                self.feedback
                    .missing
                    .insert(frame_id.as_raw(), FrameLoss::Packets(missing));
                self.time_last_nacked.insert(frame_id.as_raw(), now);
            }
        }
    }

    /// Most recently built feedback message
    pub fn feedback(&self) -> &CastFeedback {
        &self.feedback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{PacketHeader, RtpTimestamp};
    use crate::sequence::PacketId;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct RecordingSink {
        sent: Rc<RefCell<Vec<CastFeedback>>>,
    }

    impl FeedbackSink for RecordingSink {
        fn send_feedback(&mut self, feedback: &CastFeedback) {
            self.sent.borrow_mut().push(feedback.clone());
        }
    }

    fn builder_with_sink(config: FeedbackConfig) -> (CastFeedbackBuilder, Rc<RefCell<Vec<CastFeedback>>>) {
        let sent = Rc::new(RefCell::new(Vec::new()));
        let sink = RecordingSink { sent: sent.clone() };
        (CastFeedbackBuilder::new(config, Box::new(sink)), sent)
    }

    fn header(frame_id: u8, packet_id: u16, max_packet_id: u16, key: bool) -> PacketHeader {
        PacketHeader {
            frame_id: FrameId::new(frame_id),
            packet_id: PacketId::new(packet_id),
            max_packet_id: PacketId::new(max_packet_id),
            referenced_frame_id: FrameId::new(if key { frame_id } else { frame_id.wrapping_sub(1) }),
            is_key_frame: key,
            rtp_timestamp: RtpTimestamp::new(0),
        }
    }

    #[test]
    fn test_ack_advances_on_completion() {
        let (mut builder, sent) = builder_with_sink(FeedbackConfig::default());
        let mut map = FrameIdMap::new();
        let now = Instant::now();

        map.insert_packet(&header(0, 0, 0, true));
        builder.complete_frame_received(FrameId::new(0), &map, now);

        let messages = sent.borrow();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].ack_frame_id, FrameId::new(0));
        assert!(messages[0].missing.is_empty());
    }

    #[test]
    fn test_no_emit_when_ack_unchanged() {
        let (mut builder, sent) = builder_with_sink(FeedbackConfig::default());
        let mut map = FrameIdMap::new();
        let now = Instant::now();

        map.insert_packet(&header(0, 0, 0, true));
        builder.complete_frame_received(FrameId::new(0), &map, now);

        // Frame 2 completes behind a gap: frontier unchanged, nothing sent
        map.insert_packet(&header(2, 0, 0, false));
        builder.complete_frame_received(FrameId::new(2), &map, now);
        assert_eq!(sent.borrow().len(), 1);
    }

    #[test]
    fn test_nack_list_contents() {
        let (mut builder, sent) = builder_with_sink(FeedbackConfig::default());
        let mut map = FrameIdMap::new();
        let now = Instant::now();

        map.insert_packet(&header(0, 0, 0, true));
        // Frame 1 entirely absent; frame 2 has packet 1 of 0..=2; frame 3 is
        // the newest with packet 5 of 0..=9 (capped NACK)
        map.insert_packet(&header(2, 1, 2, false));
        map.insert_packet(&header(3, 5, 9, false));

        builder.complete_frame_received(FrameId::new(0), &map, now);

        let messages = sent.borrow();
        let missing = &messages[0].missing;
        assert_eq!(missing.get(&1), Some(&FrameLoss::EntireFrame));
        assert_eq!(
            missing.get(&2),
            Some(&FrameLoss::Packets([0, 2].into_iter().collect()))
        );
        // Newest frame capped at highest seen packet id 5
        assert_eq!(
            missing.get(&3),
            Some(&FrameLoss::Packets([0, 1, 2, 3, 4].into_iter().collect()))
        );
    }

    #[test]
    fn test_nack_repeat_interval() {
        let (mut builder, sent) = builder_with_sink(FeedbackConfig::default());
        let mut map = FrameIdMap::new();
        let t0 = Instant::now();

        map.insert_packet(&header(0, 0, 0, true));
        map.insert_packet(&header(2, 0, 0, false));
        builder.complete_frame_received(FrameId::new(0), &map, t0);
        assert_eq!(
            sent.borrow()[0].missing.get(&1),
            Some(&FrameLoss::EntireFrame)
        );

        // Within the retry interval the frame is not re-NACKed
        builder.rebuild(&map, t0 + Duration::from_millis(5));
        assert!(sent.borrow()[1].missing.is_empty());

        // After the interval it is
        builder.rebuild(&map, t0 + Duration::from_millis(40));
        assert_eq!(
            sent.borrow()[2].missing.get(&1),
            Some(&FrameLoss::EntireFrame)
        );
    }

    #[test]
    fn test_slow_ack_every_other_frame() {
        let config = FeedbackConfig {
            max_unacked_frames: 0,
            ..FeedbackConfig::default()
        };
        let (mut builder, sent) = builder_with_sink(config);
        let mut map = FrameIdMap::new();
        let now = Instant::now();

        // Ten frames complete one after another, none released
        for id in 0u8..10 {
            map.insert_packet(&header(id, 0, 0, id == 0));
            builder.complete_frame_received(FrameId::new(id), &map, now);
        }

        let acks: Vec<u8> = sent
            .borrow()
            .iter()
            .map(|m| m.ack_frame_id.as_raw())
            .collect();
        // Frame 0 acked normally; slow-ack then acks every other candidate,
        // trailing the completion point
        assert_eq!(acks, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_slow_ack_exits_when_backlog_drains() {
        let config = FeedbackConfig {
            max_unacked_frames: 0,
            ..FeedbackConfig::default()
        };
        let (mut builder, sent) = builder_with_sink(config);
        let mut map = FrameIdMap::new();
        let now = Instant::now();

        for id in 0u8..4 {
            map.insert_packet(&header(id, 0, 0, id == 0));
            builder.complete_frame_received(FrameId::new(id), &map, now);
        }

        // Consumer catches up: all four frames released
        map.remove_old_frames(FrameId::new(3));
        map.insert_packet(&header(4, 0, 0, false));
        builder.complete_frame_received(FrameId::new(4), &map, now);

        // Out of slow-ack: ack jumps straight to the live frontier
        assert_eq!(
            sent.borrow().last().unwrap().ack_frame_id,
            FrameId::new(4)
        );
    }

    #[test]
    fn test_backlog_of_one_never_throttles() {
        let config = FeedbackConfig {
            max_unacked_frames: 0,
            ..FeedbackConfig::default()
        };
        let (mut builder, sent) = builder_with_sink(config);
        let mut map = FrameIdMap::new();
        let now = Instant::now();

        // The consumer keeps up: at every completion exactly one frame is
        // pending, which must not trip the throttle even with threshold 0
        for id in 0u8..4 {
            map.insert_packet(&header(id, 0, 0, id == 0));
            builder.complete_frame_received(FrameId::new(id), &map, now);
            map.remove_old_frames(FrameId::new(id));
        }

        let acks: Vec<u8> = sent
            .borrow()
            .iter()
            .map(|m| m.ack_frame_id.as_raw())
            .collect();
        assert_eq!(acks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_decoder_faster_disables_slow_ack() {
        let config = FeedbackConfig {
            decoder_faster_than_max_frame_rate: true,
            max_unacked_frames: 0,
            ..FeedbackConfig::default()
        };
        let (mut builder, sent) = builder_with_sink(config);
        let mut map = FrameIdMap::new();
        let now = Instant::now();

        for id in 0u8..5 {
            map.insert_packet(&header(id, 0, 0, id == 0));
            builder.complete_frame_received(FrameId::new(id), &map, now);
        }

        let acks: Vec<u8> = sent
            .borrow()
            .iter()
            .map(|m| m.ack_frame_id.as_raw())
            .collect();
        assert_eq!(acks, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_periodic_update_interval_gate() {
        let (mut builder, sent) = builder_with_sink(FeedbackConfig::default());
        let mut map = FrameIdMap::new();
        let t0 = Instant::now();

        assert_eq!(builder.time_to_send_next_cast_message(&map, t0), None);

        // Packets 0 and 2 of four: packet 1 is NACKable, packet 3 is beyond
        // the highest id seen and stays capped away
        map.insert_packet(&header(0, 0, 3, true));
        map.insert_packet(&header(0, 2, 3, true));
        // First tick only latches the update time
        builder.update_cast_message(&map, t0);
        assert!(sent.borrow().is_empty());
        assert_eq!(
            builder.time_to_send_next_cast_message(&map, t0),
            Some(t0 + Duration::from_millis(33))
        );

        // Too soon: gated
        builder.update_cast_message(&map, t0 + Duration::from_millis(10));
        assert!(sent.borrow().is_empty());

        // Past the interval: emits (with a NACK for the missing packet)
        builder.update_cast_message(&map, t0 + Duration::from_millis(40));
        assert_eq!(sent.borrow().len(), 1);
        assert_eq!(
            sent.borrow()[0].missing.get(&0),
            Some(&FrameLoss::Packets([1].into_iter().collect()))
        );
    }

    #[test]
    fn test_reset() {
        let (mut builder, _sent) = builder_with_sink(FeedbackConfig::default());
        let mut map = FrameIdMap::new();
        let now = Instant::now();

        map.insert_packet(&header(0, 0, 0, true));
        builder.complete_frame_received(FrameId::new(0), &map, now);
        assert_eq!(builder.feedback().ack_frame_id, FrameId::new(0));

        builder.reset();
        assert_eq!(builder.feedback().ack_frame_id, FrameId::START);
        assert!(builder.feedback().missing.is_empty());
    }
}
