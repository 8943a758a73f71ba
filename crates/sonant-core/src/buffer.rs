//! Multi-channel sample buffers owned by signal producers.
//!
//! Every producer owns exactly one [`SampleBuffer`] of `channels × block_size`
//! samples, allocated during configuration and never resized while rendering.
//! Zero-channel buffers are valid and are used by control-only producers such
//! as MIDI controllers.

use alloc::collections::TryReserveError;
use alloc::vec;
use alloc::vec::Vec;

/// An owned, non-interleaved block of samples.
///
/// Channels are stored as separate vectors of equal length. The length is the
/// configured block size; renders write a prefix `[0, sample_count)`.
#[derive(Debug, Clone, Default)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
    block_size: usize,
}

impl SampleBuffer {
    /// Creates a zeroed buffer.
    pub fn new(channels: usize, block_size: usize) -> Self {
        Self {
            channels: (0..channels).map(|_| vec![0.0; block_size]).collect(),
            block_size,
        }
    }

    /// Reallocates the buffer for `channels × block_size` samples, zeroed.
    ///
    /// Existing storage is reused when it is already large enough.
    pub fn try_configure(
        &mut self,
        channels: usize,
        block_size: usize,
    ) -> Result<(), TryReserveError> {
        if self.channels.len() != channels {
            self.channels.clear();
            self.channels.try_reserve_exact(channels)?;
            for _ in 0..channels {
                self.channels.push(Vec::new());
            }
        }

        for channel in &mut self.channels {
            channel.clear();
            channel.try_reserve_exact(block_size)?;
            channel.resize(block_size, 0.0);
        }

        self.block_size = block_size;
        Ok(())
    }

    /// Number of channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Samples per channel.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Returns one channel.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channel_count()`.
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.channels[index]
    }

    /// Returns one channel mutably.
    ///
    /// # Panics
    ///
    /// Panics if `index >= channel_count()`.
    #[inline]
    pub fn channel_mut(&mut self, index: usize) -> &mut [f32] {
        &mut self.channels[index]
    }

    /// Returns a stereo pair of mutable channels `(0, 1)`.
    ///
    /// # Panics
    ///
    /// Panics if the buffer has fewer than two channels.
    #[inline]
    pub fn stereo_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        let (left, right) = self.channels.split_at_mut(1);
        (&mut left[0], &mut right[0])
    }

    /// Iterates channels.
    pub fn channels(&self) -> impl Iterator<Item = &[f32]> {
        self.channels.iter().map(Vec::as_slice)
    }

    /// Fills every channel with zeros.
    pub fn clear(&mut self) {
        for channel in &mut self.channels {
            channel.fill(0.0);
        }
    }

    /// Zeroes `[first, last)` on every channel.
    #[inline]
    pub fn clear_range(&mut self, first: usize, last: usize) {
        for channel in &mut self.channels {
            channel[first..last].fill(0.0);
        }
    }

    /// Adds `[first, last)` of `other` into this buffer, channel by channel.
    ///
    /// Mono sources are added to every channel.
    #[inline]
    pub fn accumulate_range(&mut self, other: &SampleBuffer, first: usize, last: usize) {
        let source_channels = other.channel_count();
        if source_channels == 0 {
            return;
        }
        for (index, channel) in self.channels.iter_mut().enumerate() {
            let source = &other.channels[index.min(source_channels - 1)];
            for (dst, src) in channel[first..last].iter_mut().zip(&source[first..last]) {
                *dst += *src;
            }
        }
    }

    /// Copies `[first, last)` of `other` into this buffer.
    ///
    /// Mono sources are copied into every channel.
    #[inline]
    pub fn copy_range(&mut self, other: &SampleBuffer, first: usize, last: usize) {
        let source_channels = other.channel_count();
        if source_channels == 0 {
            self.clear_range(first, last);
            return;
        }
        for (index, channel) in self.channels.iter_mut().enumerate() {
            let source = &other.channels[index.min(source_channels - 1)];
            channel[first..last].copy_from_slice(&source[first..last]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_is_zeroed() {
        let buffer = SampleBuffer::new(2, 64);
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.block_size(), 64);
        assert!(buffer.channels().all(|c| c.iter().all(|&s| s == 0.0)));
    }

    #[test]
    fn zero_channel_buffer_is_valid() {
        let mut buffer = SampleBuffer::new(0, 128);
        buffer.clear();
        assert_eq!(buffer.channel_count(), 0);
        assert_eq!(buffer.block_size(), 128);
    }

    #[test]
    fn reconfigure_keeps_channels_zeroed() {
        let mut buffer = SampleBuffer::new(1, 16);
        buffer.channel_mut(0).fill(0.5);
        buffer.try_configure(1, 32).unwrap();
        assert_eq!(buffer.channel(0).len(), 32);
        assert!(buffer.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn accumulate_mono_into_stereo() {
        let mut mono = SampleBuffer::new(1, 8);
        mono.channel_mut(0).fill(0.25);
        let mut stereo = SampleBuffer::new(2, 8);
        stereo.accumulate_range(&mono, 2, 6);
        stereo.accumulate_range(&mono, 4, 8);

        assert_eq!(stereo.channel(0)[1], 0.0);
        assert_eq!(stereo.channel(0)[3], 0.25);
        assert_eq!(stereo.channel(1)[5], 0.5);
        assert_eq!(stereo.channel(1)[7], 0.25);
    }

    #[test]
    fn copy_range_overwrites_only_the_range() {
        let mut source = SampleBuffer::new(2, 4);
        source.channel_mut(0).fill(1.0);
        source.channel_mut(1).fill(-1.0);
        let mut target = SampleBuffer::new(2, 4);
        target.channel_mut(0).fill(9.0);

        target.copy_range(&source, 1, 3);
        assert_eq!(target.channel(0), &[9.0, 1.0, 1.0, 9.0]);
        assert_eq!(target.channel(1), &[0.0, -1.0, -1.0, 0.0]);
    }
}
