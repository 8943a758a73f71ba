//! Second-order IIR filter section with RBJ cookbook coefficients.

use core::f32::consts::PI;
use libm::{cosf, sinf};

/// Response type of a [`Biquad`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterKind {
    /// 12 dB/oct low-pass.
    #[default]
    LowPass,
    /// 12 dB/oct high-pass.
    HighPass,
    /// Constant 0 dB peak band-pass.
    BandPass,
    /// Band-reject.
    Notch,
}

impl FilterKind {
    /// Every kind, in parameter order.
    pub const ALL: [FilterKind; 4] = [
        FilterKind::LowPass,
        FilterKind::HighPass,
        FilterKind::BandPass,
        FilterKind::Notch,
    ];

    /// Kind for a stepped parameter index; out-of-range indexes clamp.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }
}

/// Normalized coefficients (`a0 == 1`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoefficients {
    /// Feedforward.
    pub b0: f32,
    /// Feedforward.
    pub b1: f32,
    /// Feedforward.
    pub b2: f32,
    /// Feedback.
    pub a1: f32,
    /// Feedback.
    pub a2: f32,
}

impl BiquadCoefficients {
    /// Passes the input through unchanged.
    pub const IDENTITY: Self = Self {
        b0: 1.0,
        b1: 0.0,
        b2: 0.0,
        a1: 0.0,
        a2: 0.0,
    };

    /// RBJ cookbook design. `frequency` is clamped below Nyquist and `q` to
    /// a small positive minimum.
    pub fn design(kind: FilterKind, frequency: f32, q: f32, sample_rate: f32) -> Self {
        let frequency = frequency.clamp(1.0, sample_rate * 0.49);
        let omega = 2.0 * PI * frequency / sample_rate;
        let cos_omega = cosf(omega);
        let alpha = sinf(omega) / (2.0 * q.max(0.01));

        let (b0, b1, b2) = match kind {
            FilterKind::LowPass => {
                let b1 = 1.0 - cos_omega;
                (b1 * 0.5, b1, b1 * 0.5)
            }
            FilterKind::HighPass => {
                let b1 = -(1.0 + cos_omega);
                (-b1 * 0.5, b1, -b1 * 0.5)
            }
            FilterKind::BandPass => (alpha, 0.0, -alpha),
            FilterKind::Notch => (1.0, -2.0 * cos_omega, 1.0),
        };

        let a0_inv = 1.0 / (1.0 + alpha);
        Self {
            b0: b0 * a0_inv,
            b1: b1 * a0_inv,
            b2: b2 * a0_inv,
            a1: -2.0 * cos_omega * a0_inv,
            a2: (1.0 - alpha) * a0_inv,
        }
    }
}

impl Default for BiquadCoefficients {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Direct Form I biquad:
///
/// ```text
/// y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2] - a1*y[n-1] - a2*y[n-2]
/// ```
///
/// ```rust
/// use sonant_core::{Biquad, BiquadCoefficients, FilterKind};
///
/// let mut lp = Biquad::new();
/// lp.set_coefficients(BiquadCoefficients::design(FilterKind::LowPass, 1000.0, 0.707, 48000.0));
/// let mut y = 0.0;
/// for _ in 0..4800 {
///     y = lp.process(1.0);
/// }
/// assert!((y - 1.0).abs() < 1e-3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct Biquad {
    coefficients: BiquadCoefficients,
    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    /// A pass-through section with cleared state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the coefficients, keeping the state.
    #[inline]
    pub fn set_coefficients(&mut self, coefficients: BiquadCoefficients) {
        self.coefficients = coefficients;
    }

    /// Current coefficients.
    pub fn coefficients(&self) -> &BiquadCoefficients {
        &self.coefficients
    }

    /// Filters one sample.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let c = &self.coefficients;
        let output = c.b0 * input + c.b1 * self.x1 + c.b2 * self.x2 - c.a1 * self.y1 - c.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    /// Clears the state; coefficients are kept.
    pub fn clear(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settle(kind: FilterKind, frequency: f32, input: impl Fn(usize) -> f32) -> f32 {
        let mut filter = Biquad::new();
        filter.set_coefficients(BiquadCoefficients::design(kind, frequency, 0.707, 48000.0));
        let mut peak = 0.0_f32;
        for n in 0..48000 {
            let y = filter.process(input(n));
            if n > 24000 {
                peak = peak.max(y.abs());
            }
        }
        peak
    }

    fn sine(frequency: f32) -> impl Fn(usize) -> f32 {
        move |n| sinf(2.0 * PI * frequency * n as f32 / 48000.0)
    }

    #[test]
    fn identity_passes_through() {
        let mut filter = Biquad::new();
        assert_eq!(filter.process(0.3), 0.3);
        assert_eq!(filter.process(-0.7), -0.7);
    }

    #[test]
    fn lowpass_passes_dc_and_cuts_highs() {
        assert!((settle(FilterKind::LowPass, 1000.0, |_| 1.0) - 1.0).abs() < 1e-3);
        assert!(settle(FilterKind::LowPass, 200.0, sine(8000.0)) < 0.01);
    }

    #[test]
    fn highpass_blocks_dc() {
        assert!(settle(FilterKind::HighPass, 1000.0, |_| 1.0) < 1e-3);
    }

    #[test]
    fn notch_removes_its_centre() {
        assert!(settle(FilterKind::Notch, 1000.0, sine(1000.0)) < 0.05);
    }

    #[test]
    fn frequency_above_nyquist_stays_stable() {
        let coefficients = BiquadCoefficients::design(FilterKind::LowPass, 40000.0, 0.707, 48000.0);
        assert!(coefficients.a2.abs() < 1.0);
    }

    #[test]
    fn from_index_clamps() {
        assert_eq!(FilterKind::from_index(1), FilterKind::HighPass);
        assert_eq!(FilterKind::from_index(99), FilterKind::Notch);
    }
}
