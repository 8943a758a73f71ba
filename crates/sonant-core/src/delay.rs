//! Circular delay line with fractional reads.
//!
//! The storage is reserved in [`DelayLine::allocate`], which belongs to a
//! producer's configuration step. Reads and writes never allocate.

use alloc::collections::TryReserveError;
use alloc::vec::Vec;

/// A heap-backed delay line with linear interpolation.
///
/// ```rust
/// use sonant_core::DelayLine;
///
/// let mut line = DelayLine::new();
/// line.allocate(8).unwrap();
/// line.write(1.0);
/// line.write(0.0);
/// assert_eq!(line.read(2.0), 1.0);
/// assert_eq!(line.read(1.5), 0.5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl DelayLine {
    /// An empty line; reads return silence until allocated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resizes to hold `max_delay_samples` of history and clears it.
    pub fn allocate(&mut self, max_delay_samples: usize) -> Result<(), TryReserveError> {
        let len = max_delay_samples.max(1) + 1;
        self.buffer.clear();
        self.buffer.try_reserve_exact(len)?;
        self.buffer.resize(len, 0.0);
        self.write_pos = 0;
        Ok(())
    }

    /// Longest readable delay in samples.
    pub fn max_delay(&self) -> usize {
        self.buffer.len().saturating_sub(1)
    }

    /// Sample written `delay_samples` writes ago, `1.0` being the most
    /// recent one. Fractional delays interpolate linearly; the delay is
    /// clamped to `[1, max_delay]`.
    #[inline]
    pub fn read(&self, delay_samples: f32) -> f32 {
        let len = self.buffer.len();
        if len < 2 {
            return 0.0;
        }
        let delay = delay_samples.clamp(1.0, (len - 1) as f32);
        let whole = delay as usize;
        let frac = delay - whole as f32;

        let newer = self.buffer[(self.write_pos + len - whole) % len];
        if frac == 0.0 {
            return newer;
        }
        let older = self.buffer[(self.write_pos + len - whole - 1) % len];
        newer + (older - newer) * frac
    }

    /// Appends a sample.
    #[inline]
    pub fn write(&mut self, sample: f32) {
        if self.buffer.is_empty() {
            return;
        }
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    /// Silences the history.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}
