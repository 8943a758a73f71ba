//! Voice oscillators.
//!
//! Phase-accumulating oscillators with PolyBLEP correction on the
//! discontinuous waveforms, plus the pitch helpers voices use to turn notes,
//! bends and detune into frequencies.

use core::f32::consts::TAU;

use libm::{floorf, powf, sinf};

/// Oscillator waveform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Waveform {
    /// Pure fundamental.
    Sine,
    /// Odd harmonics, rolled off.
    Triangle,
    /// All harmonics.
    #[default]
    Saw,
    /// Odd harmonics, 50% duty cycle.
    Square,
}

impl Waveform {
    /// Every waveform, in parameter order.
    pub const ALL: [Waveform; 4] = [
        Waveform::Sine,
        Waveform::Triangle,
        Waveform::Saw,
        Waveform::Square,
    ];

    /// Waveform at `index`, clamped to the last one.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }
}

/// A band-limited oscillator with a phase-modulation input.
///
/// ```rust
/// use sonant_synth::{Oscillator, Waveform};
///
/// let mut osc = Oscillator::new(48000.0);
/// osc.set_waveform(Waveform::Square);
/// osc.set_frequency(220.0);
/// let first = osc.advance();
/// assert!(first.abs() <= 1.0);
/// ```
#[derive(Debug, Clone)]
pub struct Oscillator {
    phase: f32,
    increment: f32,
    frequency: f32,
    sample_rate: f32,
    waveform: Waveform,
}

impl Oscillator {
    /// An oscillator at 440 Hz.
    pub fn new(sample_rate: f32) -> Self {
        let mut osc = Self {
            phase: 0.0,
            increment: 0.0,
            frequency: 440.0,
            sample_rate,
            waveform: Waveform::default(),
        };
        osc.set_frequency(440.0);
        osc
    }

    /// Sets the frequency in Hz. Negative values are treated as zero.
    pub fn set_frequency(&mut self, frequency: f32) {
        self.frequency = frequency.max(0.0);
        // Keep the increment below Nyquist so PolyBLEP windows stay valid.
        self.increment = (self.frequency / self.sample_rate).min(0.5);
    }

    /// Frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Changes the sample rate, keeping the frequency.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.set_frequency(self.frequency);
    }

    /// Selects the waveform.
    pub fn set_waveform(&mut self, waveform: Waveform) {
        self.waveform = waveform;
    }

    /// Current waveform.
    pub fn waveform(&self) -> Waveform {
        self.waveform
    }

    /// Phase in `[0, 1)`.
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Restarts the cycle.
    pub fn reset(&mut self) {
        self.phase = 0.0;
    }

    /// Next sample.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        let out = self.shape(self.phase);
        self.step();
        out
    }

    /// Next sample with the read position offset by `radians`.
    ///
    /// The accumulator itself is not modulated, so the pitch stays put when
    /// the modulation returns to zero.
    #[inline]
    pub fn advance_pm(&mut self, radians: f32) -> f32 {
        let out = if radians == 0.0 {
            self.shape(self.phase)
        } else {
            self.shape(wrap(self.phase + radians / TAU))
        };
        self.step();
        out
    }

    #[inline]
    fn step(&mut self) {
        self.phase += self.increment;
        if self.phase >= 1.0 {
            self.phase -= 1.0;
        }
    }

    #[inline]
    fn shape(&self, phase: f32) -> f32 {
        let dt = self.increment;
        match self.waveform {
            Waveform::Sine => sinf(phase * TAU),
            Waveform::Triangle => {
                if phase < 0.5 {
                    4.0 * phase - 1.0
                } else {
                    3.0 - 4.0 * phase
                }
            }
            Waveform::Saw => 2.0 * phase - 1.0 - blep(phase, dt),
            Waveform::Square => {
                let naive = if phase < 0.5 { 1.0 } else { -1.0 };
                naive + blep(phase, dt) - blep(wrap(phase + 0.5), dt)
            }
        }
    }
}

impl Default for Oscillator {
    fn default() -> Self {
        Self::new(48000.0)
    }
}

#[inline]
fn wrap(phase: f32) -> f32 {
    phase - floorf(phase)
}

/// Two-sample polynomial residual of a unit step at phase 0.
#[inline]
fn blep(t: f32, dt: f32) -> f32 {
    if dt <= 0.0 {
        0.0
    } else if t < dt {
        let x = t / dt;
        2.0 * x - x * x - 1.0
    } else if t > 1.0 - dt {
        let x = (t - 1.0) / dt;
        x * x + 2.0 * x + 1.0
    } else {
        0.0
    }
}

/// Frequency of a (possibly fractional) MIDI note, A4 = 69 = 440 Hz.
#[inline]
pub fn note_frequency(note: f32) -> f32 {
    440.0 * powf(2.0, (note - 69.0) / 12.0)
}

/// Frequency ratio of a detune in cents.
#[inline]
pub fn cents_to_ratio(cents: f32) -> f32 {
    powf(2.0, cents / 1200.0)
}
