//! Round counter used as the memoization key of the producer graph.

/// Identifies one host-driven render call.
///
/// Rounds only ever move forward within a session. Producers compare the
/// round they are asked to render against the last round they rendered; an
/// equal round means the cached buffer is still valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Round(pub u64);

impl Round {
    /// The round after this one.
    #[inline]
    pub const fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// Monotonic source of [`Round`]s, owned by the graph root.
///
/// Audio-thread only.
#[derive(Debug, Clone, Default)]
pub struct RoundCounter {
    current: Round,
}

impl RoundCounter {
    /// Starts at round zero. The first [`advance`](Self::advance) yields round 1.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bumps the counter and returns the new round.
    #[inline]
    pub fn advance(&mut self) -> Round {
        self.current = self.current.next();
        self.current
    }

    /// The most recently issued round.
    pub fn current(&self) -> Round {
        self.current
    }
}
