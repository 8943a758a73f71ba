//! Parameter metadata: stable ids, ranges, scaling curves and display hints.
//!
//! Every host-visible parameter is described by a [`ParamDescriptor`]. The
//! host always talks in normalized `[0, 1]` values; the descriptor maps them
//! to the plain value a producer works with through its [`ParamScale`].
//!
//! ```rust
//! use sonant_core::{ParamDescriptor, ParamId, ParamScale, ParamUnit};
//!
//! let cutoff = ParamDescriptor::new("Filter Cutoff", "Cutoff", 20.0, 20000.0, 20000.0)
//!     .with_id(ParamId(4), "flt_cutoff")
//!     .with_unit(ParamUnit::Hertz)
//!     .with_scale(ParamScale::Logarithmic);
//!
//! assert!((cutoff.denormalize(0.0) - 20.0).abs() < 1e-3);
//! assert!((cutoff.normalize(20000.0) - 1.0).abs() < 1e-6);
//! ```

/// Scaling curve between normalized and plain values.
///
/// - **Linear**: `normalized = (value - min) / (max - min)`
/// - **Logarithmic**: `normalized = ln(value/min) / ln(max/min)`
/// - **Power(exp)**: `normalized = ((value - min) / (max - min)).powf(1.0 / exp)`
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum ParamScale {
    /// Equal resolution across the range.
    #[default]
    Linear,
    /// More resolution at low values; requires `min > 0.0`.
    Logarithmic,
    /// Power curve; exponents above 1.0 give more resolution at the low end of
    /// the knob travel.
    Power(f32),
}

/// Stable numeric parameter identifier, part of the host contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(pub u32);

/// Parameter capability flags for host communication.
///
/// ```rust
/// use sonant_core::ParamFlags;
///
/// let flags = ParamFlags::AUTOMATABLE.union(ParamFlags::STEPPED);
/// assert!(flags.contains(ParamFlags::STEPPED));
/// assert!(!flags.contains(ParamFlags::HIDDEN));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamFlags(u8);

impl ParamFlags {
    /// No flags.
    pub const NONE: Self = Self(0);
    /// Host may automate the parameter.
    pub const AUTOMATABLE: Self = Self(1 << 0);
    /// Only discrete values are meaningful.
    pub const STEPPED: Self = Self(1 << 1);
    /// Not shown in generic host editors.
    pub const HIDDEN: Self = Self(1 << 2);
    /// Can be assigned to a MIDI controller or macro.
    pub const ASSIGNABLE: Self = Self(1 << 3);

    /// Whether every bit of `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Bitwise union.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

impl Default for ParamFlags {
    fn default() -> Self {
        Self::AUTOMATABLE.union(Self::ASSIGNABLE)
    }
}

/// Display unit of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamUnit {
    /// Hertz.
    Hertz,
    /// Seconds.
    Seconds,
    /// Semitones.
    Semitones,
    /// Cents.
    Cents,
    /// Percent of the range.
    Percent,
    /// Frequency ratio.
    Ratio,
    /// Index into a list of named choices.
    Choice,
    /// Dimensionless.
    None,
}

impl ParamUnit {
    /// Suffix appended to formatted values.
    pub const fn suffix(&self) -> &'static str {
        match self {
            ParamUnit::Hertz => " Hz",
            ParamUnit::Seconds => " s",
            ParamUnit::Semitones => " st",
            ParamUnit::Cents => " ct",
            ParamUnit::Percent => "%",
            ParamUnit::Ratio => "x",
            ParamUnit::Choice | ParamUnit::None => "",
        }
    }
}

/// Everything a host or editor needs to know about one parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamDescriptor {
    /// Full display name.
    pub name: &'static str,
    /// Short name for narrow displays, at most 8 characters.
    pub short_name: &'static str,
    /// Display unit.
    pub unit: ParamUnit,
    /// Minimum plain value.
    pub min: f32,
    /// Maximum plain value.
    pub max: f32,
    /// Default plain value.
    pub default: f32,
    /// Decimal places to show when formatting.
    pub precision: u8,
    /// Stable numeric id.
    pub id: ParamId,
    /// Stable string id used in configuration and logs.
    pub string_id: &'static str,
    /// Normalization curve.
    pub scale: ParamScale,
    /// Host capability flags.
    pub flags: ParamFlags,
    /// Group for host tree display.
    pub group: &'static str,
}

impl ParamDescriptor {
    /// A linear, automatable parameter with two decimals of display precision.
    pub const fn new(
        name: &'static str,
        short_name: &'static str,
        min: f32,
        max: f32,
        default: f32,
    ) -> Self {
        Self {
            name,
            short_name,
            unit: ParamUnit::None,
            min,
            max,
            default,
            precision: 2,
            id: ParamId(0),
            string_id: "",
            scale: ParamScale::Linear,
            flags: ParamFlags::AUTOMATABLE.union(ParamFlags::ASSIGNABLE),
            group: "",
        }
    }

    /// A stepped parameter selecting one of `count` choices.
    pub const fn choice(name: &'static str, short_name: &'static str, count: u16, default: u16) -> Self {
        let mut descriptor = Self::new(name, short_name, 0.0, (count - 1) as f32, default as f32);
        descriptor.unit = ParamUnit::Choice;
        descriptor.precision = 0;
        descriptor.flags = ParamFlags::AUTOMATABLE.union(ParamFlags::STEPPED);
        descriptor
    }

    /// Sets the stable ids.
    pub const fn with_id(mut self, id: ParamId, string_id: &'static str) -> Self {
        self.id = id;
        self.string_id = string_id;
        self
    }

    /// Sets the display unit.
    pub const fn with_unit(mut self, unit: ParamUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Sets the normalization curve.
    pub const fn with_scale(mut self, scale: ParamScale) -> Self {
        self.scale = scale;
        self
    }

    /// Sets display precision.
    pub const fn with_precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    /// Replaces the flags.
    pub const fn with_flags(mut self, flags: ParamFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets the group.
    pub const fn with_group(mut self, group: &'static str) -> Self {
        self.group = group;
        self
    }

    /// Clamps a plain value into `[min, max]`.
    #[inline]
    pub fn clamp(&self, value: f32) -> f32 {
        if value < self.min {
            self.min
        } else if value > self.max {
            self.max
        } else {
            value
        }
    }

    /// Plain value → normalized `[0, 1]`.
    #[inline]
    pub fn normalize(&self, value: f32) -> f32 {
        let range = self.max - self.min;
        if range == 0.0 {
            return 0.0;
        }
        let value = self.clamp(value);
        let normalized = match self.scale {
            ParamScale::Linear => (value - self.min) / range,
            ParamScale::Logarithmic => {
                if self.min <= 0.0 {
                    return 0.0;
                }
                libm::logf(value / self.min) / libm::logf(self.max / self.min)
            }
            ParamScale::Power(exp) => libm::powf((value - self.min) / range, 1.0 / exp),
        };
        normalized.clamp(0.0, 1.0)
    }

    /// Normalized `[0, 1]` → plain value. Stepped parameters snap to the
    /// nearest integer.
    #[inline]
    pub fn denormalize(&self, normalized: f32) -> f32 {
        let normalized = normalized.clamp(0.0, 1.0);
        let value = match self.scale {
            ParamScale::Linear => self.min + normalized * (self.max - self.min),
            ParamScale::Logarithmic => {
                if self.min <= 0.0 {
                    return self.min;
                }
                self.min * libm::powf(self.max / self.min, normalized)
            }
            ParamScale::Power(exp) => self.min + libm::powf(normalized, exp) * (self.max - self.min),
        };
        if self.flags.contains(ParamFlags::STEPPED) {
            libm::roundf(value)
        } else {
            self.clamp(value)
        }
    }

    /// The default value, normalized.
    #[inline]
    pub fn default_normalized(&self) -> f32 {
        self.normalize(self.default)
    }

    /// Number of discrete choices for stepped parameters.
    pub fn choice_count(&self) -> Option<usize> {
        self.flags
            .contains(ParamFlags::STEPPED)
            .then(|| (self.max - self.min) as usize + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cutoff() -> ParamDescriptor {
        ParamDescriptor::new("Cutoff", "Cutoff", 20.0, 20000.0, 1000.0)
            .with_scale(ParamScale::Logarithmic)
            .with_unit(ParamUnit::Hertz)
    }

    #[test]
    fn linear_round_trip_and_clamp() {
        let desc = ParamDescriptor::new("Volume", "Vol", 0.0, 1.0, 0.75);
        assert_eq!(desc.normalize(0.25), 0.25);
        assert_eq!(desc.denormalize(0.5), 0.5);
        assert_eq!(desc.normalize(4.0), 1.0);
        assert_eq!(desc.denormalize(-1.0), 0.0);
        assert_eq!(desc.default_normalized(), 0.75);
    }

    #[test]
    fn logarithmic_midpoint_is_geometric_mean() {
        let desc = cutoff();
        let mid = desc.denormalize(0.5);
        assert!((mid - 632.455).abs() < 0.1, "got {mid}");
        assert!((desc.normalize(mid) - 0.5).abs() < 1e-5);
    }

    #[test]
    fn power_scale_favours_low_values() {
        let desc = ParamDescriptor::new("Attack", "Atk", 0.0, 6.0, 0.0).with_scale(ParamScale::Power(3.0));
        assert!(desc.denormalize(0.5) < 1.0);
        assert!((desc.normalize(desc.denormalize(0.3)) - 0.3).abs() < 1e-5);
    }

    #[test]
    fn choices_snap_to_integers() {
        let desc = ParamDescriptor::choice("Waveform", "Wave", 4, 0);
        assert_eq!(desc.choice_count(), Some(4));
        assert_eq!(desc.denormalize(0.0), 0.0);
        assert_eq!(desc.denormalize(0.4), 1.0);
        assert_eq!(desc.denormalize(1.0), 3.0);
        assert!(!desc.flags.contains(ParamFlags::ASSIGNABLE));
    }

    #[test]
    fn unit_suffixes() {
        assert_eq!(ParamUnit::Hertz.suffix(), " Hz");
        assert_eq!(ParamUnit::Choice.suffix(), "");
    }
}
