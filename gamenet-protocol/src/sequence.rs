//! Sequence Number Handling
//!
//! GameNet sequence numbers are plain 32-bit counters. The first packet a
//! sender emits is numbered 1, every later packet gets the next value, and a
//! number is never reused for the lifetime of a connection. Running out of
//! numbers is reported instead of wrapping, so ordering comparisons are the
//! natural integer ones.

use std::fmt;
use std::ops::Sub;

/// Sequence number assigned at send time
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Default)]
pub struct SeqNumber(u32);

impl SeqNumber {
    /// The value no packet ever carries; receivers start their watermark here
    pub const ZERO: SeqNumber = SeqNumber(0);

    /// The first sequence number a sender assigns
    pub const FIRST: SeqNumber = SeqNumber(1);

    /// Create a new sequence number
    #[inline]
    pub const fn new(value: u32) -> Self {
        SeqNumber(value)
    }

    /// Get the raw sequence number value
    #[inline]
    pub fn as_raw(self) -> u32 {
        self.0
    }

    /// Get the next sequence number, or `None` once the space is exhausted
    #[inline]
    pub fn next(self) -> Option<Self> {
        self.0.checked_add(1).map(SeqNumber)
    }

    /// Calculate the distance from this sequence number to another
    ///
    /// Positive values mean `other` is ahead of `self`.
    pub fn distance_to(self, other: SeqNumber) -> i64 {
        other.0 as i64 - self.0 as i64
    }
}

impl fmt::Debug for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SeqNumber({})", self.0)
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SeqNumber {
    fn from(value: u32) -> Self {
        SeqNumber(value)
    }
}

impl From<SeqNumber> for u32 {
    fn from(seq: SeqNumber) -> u32 {
        seq.0
    }
}

impl Sub for SeqNumber {
    type Output = i64;

    /// Calculate the signed distance between two sequence numbers
    fn sub(self, rhs: SeqNumber) -> i64 {
        rhs.distance_to(self)
    }
}

/// Allocates sequence numbers for one sender
#[derive(Debug)]
pub struct SeqAllocator {
    next: Option<SeqNumber>,
}

impl SeqAllocator {
    pub fn new() -> Self {
        SeqAllocator {
            next: Some(SeqNumber::FIRST),
        }
    }

    /// The number the next allocation will return, if any is left
    pub fn peek(&self) -> Option<SeqNumber> {
        self.next
    }

    /// Take the next sequence number
    pub fn allocate(&mut self) -> Option<SeqNumber> {
        let seq = self.next?;
        self.next = seq.next();
        Some(seq)
    }
}

impl Default for SeqAllocator {
    fn default() -> Self {
        Self::new()
    }
}
