//! Wrapping version counters for parameter sources.
//!
//! A source bumps its [`ChangeIndex`] on every value change. Consumers keep a
//! [`ChangeTracker`] per input and recompute derived state only when the
//! observed index differs from the one they last saw. Indexes are compared
//! for equality only, so wrapping after 2³¹ changes costs at most one extra
//! recompute.

use core::sync::atomic::{AtomicU32, Ordering};

const MASK: u32 = 0x7fff_ffff;

/// A 31-bit wrapping version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ChangeIndex(u32);

impl ChangeIndex {
    /// Index of a source that has never changed.
    pub const INITIAL: Self = Self(0);

    /// Builds an index from a raw value, discarding the top bit.
    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw & MASK)
    }

    /// The raw 31-bit value.
    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// The following index, wrapping at 2³¹.
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1) & MASK)
    }

    /// Advances in place and returns the new index.
    #[inline]
    pub fn bump(&mut self) -> Self {
        *self = self.next();
        *self
    }
}

/// A [`ChangeIndex`] shared between the control and audio threads.
#[derive(Debug, Default)]
pub struct AtomicChangeIndex(AtomicU32);

impl AtomicChangeIndex {
    /// Creates a counter at [`ChangeIndex::INITIAL`].
    pub const fn new() -> Self {
        Self(AtomicU32::new(0))
    }

    /// Creates a counter starting at `index`.
    pub const fn with_index(index: ChangeIndex) -> Self {
        Self(AtomicU32::new(index.raw()))
    }

    /// Current index.
    #[inline]
    pub fn load(&self) -> ChangeIndex {
        ChangeIndex::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Advances by exactly one and returns the new index.
    #[inline]
    pub fn bump(&self) -> ChangeIndex {
        let previous = self.0.fetch_add(1, Ordering::AcqRel);
        let next = ChangeIndex::from_raw(previous).next();
        if previous > MASK {
            // Keep the stored value inside 31 bits once it has wrapped.
            self.0.fetch_and(MASK, Ordering::AcqRel);
        }
        next
    }
}

/// Remembers the last [`ChangeIndex`] a consumer acted upon.
///
/// A fresh tracker is stale against every index, so the first comparison
/// always triggers a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeTracker {
    last_seen: u32,
}

impl ChangeTracker {
    const NEVER: u32 = u32::MAX;

    /// A tracker that has not seen any index yet.
    pub const fn new() -> Self {
        Self {
            last_seen: Self::NEVER,
        }
    }

    /// Whether `index` differs from the last refreshed one.
    #[inline]
    pub fn is_stale(&self, index: ChangeIndex) -> bool {
        self.last_seen != index.raw()
    }

    /// Records `index`; returns `true` if it was stale.
    #[inline]
    pub fn refresh(&mut self, index: ChangeIndex) -> bool {
        let stale = self.is_stale(index);
        self.last_seen = index.raw();
        stale
    }

    /// Forgets the last seen index.
    pub fn invalidate(&mut self) {
        self.last_seen = Self::NEVER;
    }
}

impl Default for ChangeTracker {
    fn default() -> Self {
        Self::new()
    }
}
