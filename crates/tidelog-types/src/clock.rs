//! Lamport logical clock.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// Lamport clock owned by one writer.
///
/// `id` is the owner's public key (hex) and doubles as the tie-break key
/// when two clocks carry the same `time`. Clocks are plain values: a log
/// replaces its clock on every append or join instead of mutating it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LamportClock {
    /// Owner of the clock.
    pub id: String,
    /// Logical time, non-decreasing across the owner's own appends.
    pub time: u64,
}

impl LamportClock {
    /// Create a clock for `id` at the given logical time.
    pub fn new(id: impl Into<String>, time: u64) -> Self {
        Self {
            id: id.into(),
            time,
        }
    }

    /// Return a clock one step ahead of this one.
    ///
    /// `None` once `time` has reached `u64::MAX`.
    pub fn tick(&self) -> Option<Self> {
        let time = self.time.checked_add(1)?;
        Some(Self::new(self.id.clone(), time))
    }

    /// Return a clock ahead of both `self` and `other`, keeping this owner.
    ///
    /// `None` if either clock is already at `u64::MAX`.
    pub fn merge(&self, other: &LamportClock) -> Option<Self> {
        let time = self.time.max(other.time).checked_add(1)?;
        Some(Self::new(self.id.clone(), time))
    }

    /// Return a copy of this clock at `time`.
    pub fn with_time(&self, time: u64) -> Self {
        Self::new(self.id.clone(), time)
    }

    /// Compare two clocks by logical time only.
    ///
    /// Callers apply their own tie-break when this returns `Equal`.
    pub fn compare(a: &LamportClock, b: &LamportClock) -> Ordering {
        a.time.cmp(&b.time)
    }
}
