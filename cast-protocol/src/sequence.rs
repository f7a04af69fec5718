//! Frame and packet identifier handling
//!
//! Frame ids are 8-bit wrapping counters and packet ids are 16-bit wrapping
//! counters. Recency comparisons between two identifiers must use modular
//! arithmetic: `a` is newer than `b` iff the wrapping difference `a - b`,
//! reinterpreted as a signed value of the same width, is positive. The derived
//! `Ord` exists only so the types can serve as stable map keys; it must never
//! be used to decide which of two ids is more recent.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};

/// Frame identifier with 8-bit wraparound semantics
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct FrameId(u8);

impl FrameId {
    /// Sentinel for "no frame released/acked yet": one below the
    /// conventional first frame id 0.
    pub const START: FrameId = FrameId(u8::MAX);

    /// Create a frame id from its raw counter value
    #[inline]
    pub fn new(value: u8) -> Self {
        FrameId(value)
    }

    /// Get the raw counter value
    #[inline]
    pub fn as_raw(self) -> u8 {
        self.0
    }

    /// Get the next frame id (wrapping)
    #[inline]
    pub fn next(self) -> Self {
        FrameId(self.0.wrapping_add(1))
    }

    /// Signed distance from this id to another, accounting for wraparound
    ///
    /// Positive means `other` is ahead of `self`, negative means behind.
    #[inline]
    pub fn distance_to(self, other: FrameId) -> i32 {
        other.0.wrapping_sub(self.0) as i8 as i32
    }

    /// Check if this id is older than another (accounting for wraparound)
    #[inline]
    pub fn lt(self, other: FrameId) -> bool {
        self.distance_to(other) > 0
    }

    /// Check if this id is older than or equal to another
    #[inline]
    pub fn le(self, other: FrameId) -> bool {
        self == other || self.lt(other)
    }

    /// Check if this id is newer than another
    #[inline]
    pub fn gt(self, other: FrameId) -> bool {
        self.distance_to(other) < 0
    }

    /// Check if this id is newer than or equal to another
    #[inline]
    pub fn ge(self, other: FrameId) -> bool {
        self == other || self.gt(other)
    }
}

impl fmt::Debug for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FrameId({})", self.0)
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u8> for FrameId {
    fn from(value: u8) -> Self {
        FrameId(value)
    }
}

impl From<FrameId> for u8 {
    fn from(id: FrameId) -> u8 {
        id.0
    }
}

impl Add<u8> for FrameId {
    type Output = FrameId;

    fn add(self, rhs: u8) -> FrameId {
        FrameId(self.0.wrapping_add(rhs))
    }
}

impl AddAssign<u8> for FrameId {
    fn add_assign(&mut self, rhs: u8) {
        self.0 = self.0.wrapping_add(rhs);
    }
}

impl Sub<u8> for FrameId {
    type Output = FrameId;

    fn sub(self, rhs: u8) -> FrameId {
        FrameId(self.0.wrapping_sub(rhs))
    }
}

impl SubAssign<u8> for FrameId {
    fn sub_assign(&mut self, rhs: u8) {
        self.0 = self.0.wrapping_sub(rhs);
    }
}

impl Sub for FrameId {
    type Output = i32;

    /// Signed distance between two frame ids
    fn sub(self, rhs: FrameId) -> i32 {
        rhs.distance_to(self)
    }
}

/// Packet identifier with 16-bit wraparound semantics
///
/// Packet ids count the packets of a single frame starting at 0; the first
/// packet of a frame carries the frame's `max_packet_id` so the receiver
/// knows the total packet count up front.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct PacketId(u16);

impl PacketId {
    /// Create a packet id from its raw counter value
    #[inline]
    pub fn new(value: u16) -> Self {
        PacketId(value)
    }

    /// Get the raw counter value
    #[inline]
    pub fn as_raw(self) -> u16 {
        self.0
    }

    /// Get the next packet id (wrapping)
    #[inline]
    pub fn next(self) -> Self {
        PacketId(self.0.wrapping_add(1))
    }

    /// Signed distance from this id to another, accounting for wraparound
    #[inline]
    pub fn distance_to(self, other: PacketId) -> i32 {
        other.0.wrapping_sub(self.0) as i16 as i32
    }

    /// Check if this id is older than another (accounting for wraparound)
    #[inline]
    pub fn lt(self, other: PacketId) -> bool {
        self.distance_to(other) > 0
    }

    /// Check if this id is older than or equal to another
    #[inline]
    pub fn le(self, other: PacketId) -> bool {
        self == other || self.lt(other)
    }

    /// Check if this id is newer than another
    #[inline]
    pub fn gt(self, other: PacketId) -> bool {
        self.distance_to(other) < 0
    }

    /// Check if this id is newer than or equal to another
    #[inline]
    pub fn ge(self, other: PacketId) -> bool {
        self == other || self.gt(other)
    }
}

impl fmt::Debug for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PacketId({})", self.0)
    }
}

impl fmt::Display for PacketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for PacketId {
    fn from(value: u16) -> Self {
        PacketId(value)
    }
}

impl From<PacketId> for u16 {
    fn from(id: PacketId) -> u16 {
        id.0
    }
}

impl Add<u16> for PacketId {
    type Output = PacketId;

    fn add(self, rhs: u16) -> PacketId {
        PacketId(self.0.wrapping_add(rhs))
    }
}

impl Sub<u16> for PacketId {
    type Output = PacketId;

    fn sub(self, rhs: u16) -> PacketId {
        PacketId(self.0.wrapping_sub(rhs))
    }
}

impl Sub for PacketId {
    type Output = i32;

    /// Signed distance between two packet ids
    fn sub(self, rhs: PacketId) -> i32 {
        rhs.distance_to(self)
    }
}
