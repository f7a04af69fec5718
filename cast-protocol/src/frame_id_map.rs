//! In-flight frame registry
//!
//! Owns the completeness state of every frame between the release frontier
//! and the newest frame seen, and answers the continuity/decodability queries
//! the release path and the feedback builder are built on.
//!
//! Frames are keyed by their raw 8-bit id in a sorted map; all recency
//! decisions go through the wraparound-safe comparisons in
//! [`crate::sequence`], never through key order.

use crate::frame_info::{FrameInfo, PacketOutcome};
use crate::packet::PacketHeader;
use crate::sequence::FrameId;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// Registry of all in-flight frames
pub struct FrameIdMap {
    /// Tracked frames, keyed by raw frame id
    frames: BTreeMap<u8, FrameInfo>,
    /// Set until the first key frame packet arrives; while set, nothing is
    /// rejected as too old
    waiting_for_key_frame: bool,
    /// Release frontier: highest frame id the consumer has accepted
    last_released_frame: FrameId,
    /// Newest frame id observed on any packet
    newest_frame_id: Option<FrameId>,
}

impl FrameIdMap {
    pub fn new() -> Self {
        FrameIdMap {
            frames: BTreeMap::new(),
            waiting_for_key_frame: true,
            last_released_frame: FrameId::START,
            newest_frame_id: None,
        }
    }

    /// Record one packet
    ///
    /// Packets for frames at or behind the release frontier are rejected as
    /// [`PacketOutcome::TooOld`], except while the stream is still waiting
    /// for its first key frame: then everything is accepted, and the moment a
    /// key frame packet arrives the frontier is retroactively seeded to one
    /// below its id so the key frame can be released as continuous.
    pub fn insert_packet(&mut self, header: &PacketHeader) -> PacketOutcome {
        if header.is_key_frame && self.waiting_for_key_frame {
            self.waiting_for_key_frame = false;
            self.last_released_frame = header.frame_id - 1;
            debug!(
                key_frame_id = %header.frame_id,
                "first key frame seen, frontier seeded"
            );
        }

        if !self.waiting_for_key_frame && header.frame_id.le(self.last_released_frame) {
            return PacketOutcome::TooOld;
        }

        let outcome = match self.frames.entry(header.frame_id.as_raw()) {
            Entry::Vacant(entry) => entry
                .insert(FrameInfo::new(
                    header.frame_id,
                    header.referenced_frame_id,
                    header.is_key_frame,
                    header.max_packet_id,
                ))
                .insert_packet(header.packet_id),
            Entry::Occupied(entry) => entry.into_mut().insert_packet(header.packet_id),
        };

        match self.newest_frame_id {
            Some(newest) if !header.frame_id.gt(newest) => {}
            _ => self.newest_frame_id = Some(header.frame_id),
        }

        outcome
    }

    /// Purge every tracked frame at or behind `frame_id` and advance the
    /// release frontier to it
    pub fn remove_old_frames(&mut self, frame_id: FrameId) {
        self.frames.retain(|&raw, _| FrameId::new(raw).gt(frame_id));
        self.last_released_frame = frame_id;
    }

    /// The exact successor of the frontier, if it is complete and
    /// continuity-eligible
    pub fn next_continuous_frame(&self) -> Option<FrameId> {
        let successor = self.last_released_frame.next();
        let frame = self.frames.get(&successor.as_raw())?;
        if !frame.complete() {
            return None;
        }
        if self.waiting_for_key_frame && !frame.is_key_frame() {
            return None;
        }
        Some(successor)
    }

    /// Walk forward from the frontier while each successive id is present and
    /// complete; returns the last id reached
    ///
    /// May equal the frontier itself when no progress is possible. This is
    /// the cumulative-ack candidate: everything at or before it is fully
    /// received.
    pub fn last_continuous_frame(&self) -> FrameId {
        let mut last = self.last_released_frame;
        while Some(last) != self.newest_frame_id {
            let next = last.next();
            match self.frames.get(&next.as_raw()) {
                Some(frame) if frame.complete() => last = next,
                _ => break,
            }
        }
        last
    }

    /// Oldest complete frame whose dependency chain resolves to
    /// already-released data
    ///
    /// Allows bridging over frames that never arrived. Never returns a
    /// non-decodable frame.
    pub fn next_frame_allowing_skipping_frames(&self) -> Option<FrameId> {
        self.frames
            .values()
            .filter(|frame| frame.complete() && self.decodable(frame))
            .map(FrameInfo::frame_id)
            .fold(None, |oldest, id| match oldest {
                Some(current) if current.le(id) => Some(current),
                _ => Some(id),
            })
    }

    /// True iff two or more complete, decodable frames are tracked
    pub fn have_multiple_decodable_frames(&self) -> bool {
        self.frames
            .values()
            .filter(|frame| frame.complete() && self.decodable(frame))
            .take(2)
            .count()
            == 2
    }

    fn decodable(&self, frame: &FrameInfo) -> bool {
        if frame.is_key_frame() {
            return true;
        }
        if self.waiting_for_key_frame {
            return false;
        }
        if frame.referenced_frame_id() == frame.frame_id() {
            return true;
        }
        frame.referenced_frame_id().le(self.last_released_frame)
    }

    /// Number of complete frames currently tracked
    pub fn number_of_complete_frames(&self) -> usize {
        self.frames.values().filter(|frame| frame.complete()).count()
    }

    /// Whether any state exists for `frame_id`
    pub fn frame_exists(&self, frame_id: FrameId) -> bool {
        self.frames.contains_key(&frame_id.as_raw())
    }

    /// Missing packet ids of a tracked frame, optionally capped at the
    /// highest packet id seen for it
    pub fn missing_packets(
        &self,
        frame_id: FrameId,
        only_up_to_highest_seen: bool,
    ) -> Option<BTreeSet<u16>> {
        self.frames
            .get(&frame_id.as_raw())
            .map(|frame| frame.missing_packets(only_up_to_highest_seen))
    }

    /// Newest frame id observed, or `None` before the first packet
    pub fn newest_frame_id(&self) -> Option<FrameId> {
        self.newest_frame_id
    }

    /// Whether any packet has ever been recorded
    pub fn has_received_packets(&self) -> bool {
        self.newest_frame_id.is_some()
    }

    /// Current release frontier
    pub fn last_released_frame(&self) -> FrameId {
        self.last_released_frame
    }

    /// Drop all state and return to the waiting-for-key-frame condition
    pub fn clear(&mut self) {
        self.frames.clear();
        self.waiting_for_key_frame = true;
        self.last_released_frame = FrameId::START;
        self.newest_frame_id = None;
    }
}

impl Default for FrameIdMap {
    fn default() -> Self {
        Self::new()
    }
}
