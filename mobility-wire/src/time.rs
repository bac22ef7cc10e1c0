//! Virtual simulation time.
//!
//! Virtual time is simulator-defined minutes-from-epoch (§3 of the protocol
//! specification); the design itself is unit-agnostic. On the wire it travels
//! as a plain JSON number, except for `/peek`, where `-1` is the sentinel for
//! `+∞` (§6).
//!
//! Internally time is stored as hundredths-of-a-minute on an `i64` rather than
//! as an `f64`, so that [`Time`] gets a total order for free and can live
//! unwrapped inside a [`BinaryHeap`](std::collections::BinaryHeap) key.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// One hundredth of a minute: the internal resolution of [`Time`].
const SUBUNITS_PER_MINUTE: i64 = 100;

/// A point in virtual simulation time, or `+∞`.
///
/// `Time` is `Copy`, totally ordered, and monotone non-decreasing is an
/// invariant enforced by the kernel and runtime, not by this type itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Time(i64);

impl Time {
    /// Virtual time zero.
    pub const ZERO: Time = Time(0);

    /// `+∞`: no event is ever scheduled at this time.
    pub const INFINITY: Time = Time(i64::MAX);

    /// Builds a `Time` from a number of virtual minutes.
    ///
    /// Fractional minutes finer than a hundredth are rounded to the nearest
    /// subunit.
    pub fn from_minutes(minutes: f64) -> Self {
        if minutes.is_infinite() && minutes.is_sign_positive() {
            return Self::INFINITY;
        }
        Time((minutes * SUBUNITS_PER_MINUTE as f64).round() as i64)
    }

    /// Returns this time as a number of virtual minutes.
    ///
    /// Returns [`f64::INFINITY`] for [`Time::INFINITY`].
    pub fn as_minutes(self) -> f64 {
        if self == Self::INFINITY {
            return f64::INFINITY;
        }
        self.0 as f64 / SUBUNITS_PER_MINUTE as f64
    }

    /// Adds a duration, in minutes, to this time.
    pub fn plus_minutes(self, minutes: f64) -> Self {
        if self == Self::INFINITY {
            return self;
        }
        Self::from_minutes(self.as_minutes() + minutes)
    }

    pub fn is_infinite(self) -> bool {
        self == Self::INFINITY
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_infinite() {
            write!(f, "+inf")
        } else {
            write!(f, "{}", self.as_minutes())
        }
    }
}

impl Serialize for Time {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.as_minutes().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Time {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let minutes = f64::deserialize(deserializer)?;
        Ok(Time::from_minutes(minutes))
    }
}

/// Encodes a [`Time`] the way `GET /peek` does: `-1` denotes `+∞` (§6).
pub fn time_to_peek_wire(t: Time) -> f64 {
    if t.is_infinite() {
        -1.0
    } else {
        t.as_minutes()
    }
}

/// Decodes a `/peek`-style wire value, where `-1` denotes `+∞` (§6).
pub fn peek_wire_to_time(next: f64) -> Time {
    if next < 0.0 {
        Time::INFINITY
    } else {
        Time::from_minutes(next)
    }
}
