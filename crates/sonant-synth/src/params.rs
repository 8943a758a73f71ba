//! The synth's parameter table.
//!
//! Every parameter has a stable numeric id (its discriminant), a stable
//! string id for presets and command lines, and a [`ParamDescriptor`].
//! Hosts address parameters in normalized `[0, 1]` space; the descriptor
//! maps that to plain units.

use sonant_core::{MacroInput, ParamDescriptor, ParamFlags, ParamId, ParamScale, ParamUnit};

use crate::polyphony::KeyboardMode;

/// Number of parameters.
pub const PARAM_COUNT: usize = 43;

/// Number of macros.
pub const MACRO_COUNT: usize = 2;

/// A synth parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum Param {
    Volume = 0,
    FilterType,
    FilterCutoff,
    FilterResonance,
    FilterLfoDepth,
    LfoRate,
    LfoWaveform,
    LfoSync,
    LfoDivision,
    DistortionDrive,
    EchoTime,
    EchoFeedback,
    EchoMix,
    Waveform,
    FmAmount,
    FmRatio,
    Detune,
    VelocitySensitivity,
    AmpAttack,
    AmpHold,
    AmpDecay,
    AmpSustain,
    AmpRelease,
    ModAttack,
    ModHold,
    ModDecay,
    ModSustain,
    ModRelease,
    KeyboardMode,
    Macro1Input,
    Macro1Min,
    Macro1Max,
    Macro1Amount,
    Macro1Midpoint,
    Macro1Distortion,
    Macro1Randomness,
    Macro2Input,
    Macro2Min,
    Macro2Max,
    Macro2Amount,
    Macro2Midpoint,
    Macro2Distortion,
    Macro2Randomness,
}

/// How a parameter reaches the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamRate {
    /// A [`FloatParam`](sonant_core::FloatParam) inside the graph follows
    /// the controller sample-accurately.
    Audio,
    /// Read from the controller once per block.
    Block,
}

impl Param {
    /// Every parameter, in id order.
    pub const ALL: [Param; PARAM_COUNT] = [
        Param::Volume,
        Param::FilterType,
        Param::FilterCutoff,
        Param::FilterResonance,
        Param::FilterLfoDepth,
        Param::LfoRate,
        Param::LfoWaveform,
        Param::LfoSync,
        Param::LfoDivision,
        Param::DistortionDrive,
        Param::EchoTime,
        Param::EchoFeedback,
        Param::EchoMix,
        Param::Waveform,
        Param::FmAmount,
        Param::FmRatio,
        Param::Detune,
        Param::VelocitySensitivity,
        Param::AmpAttack,
        Param::AmpHold,
        Param::AmpDecay,
        Param::AmpSustain,
        Param::AmpRelease,
        Param::ModAttack,
        Param::ModHold,
        Param::ModDecay,
        Param::ModSustain,
        Param::ModRelease,
        Param::KeyboardMode,
        Param::Macro1Input,
        Param::Macro1Min,
        Param::Macro1Max,
        Param::Macro1Amount,
        Param::Macro1Midpoint,
        Param::Macro1Distortion,
        Param::Macro1Randomness,
        Param::Macro2Input,
        Param::Macro2Min,
        Param::Macro2Max,
        Param::Macro2Amount,
        Param::Macro2Midpoint,
        Param::Macro2Distortion,
        Param::Macro2Randomness,
    ];

    /// Stable numeric id.
    #[inline]
    pub const fn id(self) -> u32 {
        self as u32
    }

    /// Position in [`ALL`](Self::ALL).
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Looks up a numeric id.
    pub fn from_id(id: u32) -> Option<Self> {
        Self::ALL.get(id as usize).copied()
    }

    /// Looks up a string id such as `"filter_cutoff"`.
    pub fn from_string_id(string_id: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|param| param.descriptor().string_id == string_id)
    }

    /// Whether the parameter is rendered sample-accurately or per block.
    pub const fn rate(self) -> ParamRate {
        match self {
            Param::Volume
            | Param::FilterCutoff
            | Param::FilterResonance
            | Param::FilterLfoDepth
            | Param::LfoRate
            | Param::DistortionDrive
            | Param::EchoTime
            | Param::EchoFeedback
            | Param::EchoMix => ParamRate::Audio,
            _ => ParamRate::Block,
        }
    }

    /// Macro slot and input this parameter feeds, if any.
    pub const fn macro_input(self) -> Option<(usize, MacroInput)> {
        let first = Param::Macro1Input as usize;
        let index = self as usize;
        if index < first {
            return None;
        }
        let offset = index - first;
        Some((offset / MacroInput::ALL.len(), MacroInput::ALL[offset % MacroInput::ALL.len()]))
    }

    /// Parameter feeding `input` of macro `slot`.
    pub fn for_macro(slot: usize, input: MacroInput) -> Option<Self> {
        let position = MacroInput::ALL.iter().position(|&i| i == input)?;
        Self::from_id((Param::Macro1Input as usize + slot * MacroInput::ALL.len() + position) as u32)
    }

    /// Metadata of this parameter.
    pub const fn descriptor(self) -> ParamDescriptor {
        let (descriptor, string_id, group) = match self {
            Param::Volume => (percent("Volume", "Vol", 0.75), "volume", "Output"),
            Param::FilterType => (
                ParamDescriptor::choice("Filter Type", "Type", 4, 0),
                "filter_type",
                "Filter",
            ),
            Param::FilterCutoff => (
                ParamDescriptor::new("Filter Cutoff", "Cutoff", 20.0, 20000.0, 20000.0)
                    .with_scale(ParamScale::Logarithmic)
                    .with_unit(ParamUnit::Hertz)
                    .with_precision(0),
                "filter_cutoff",
                "Filter",
            ),
            Param::FilterResonance => (
                ParamDescriptor::new("Filter Q", "Q", 0.5, 10.0, 0.707)
                    .with_scale(ParamScale::Power(2.0))
                    .with_unit(ParamUnit::Ratio),
                "filter_q",
                "Filter",
            ),
            Param::FilterLfoDepth => (
                ParamDescriptor::new("Filter LFO Depth", "LFO Amt", 0.0, 4.0, 0.0).with_precision(2),
                "filter_lfo_depth",
                "Filter",
            ),
            Param::LfoRate => (sonant_core::LFO_FREQUENCY, "lfo_rate", "LFO"),
            Param::LfoWaveform => (
                ParamDescriptor::choice("LFO Waveform", "LFO Wave", 5, 0),
                "lfo_waveform",
                "LFO",
            ),
            Param::LfoSync => (
                ParamDescriptor::choice("LFO Tempo Sync", "Sync", 2, 0),
                "lfo_sync",
                "LFO",
            ),
            Param::LfoDivision => (
                ParamDescriptor::choice("LFO Division", "Div", 9, 2),
                "lfo_division",
                "LFO",
            ),
            Param::DistortionDrive => (percent("Distortion", "Drive", 0.0), "distortion", "Effects"),
            Param::EchoTime => (
                ParamDescriptor::new("Echo Time", "Time", 0.01, 2.0, 0.3)
                    .with_scale(ParamScale::Power(2.0))
                    .with_unit(ParamUnit::Seconds)
                    .with_precision(3),
                "echo_time",
                "Effects",
            ),
            Param::EchoFeedback => (
                ParamDescriptor::new("Echo Feedback", "Fdbk", 0.0, 0.95, 0.35)
                    .with_unit(ParamUnit::Percent),
                "echo_feedback",
                "Effects",
            ),
            Param::EchoMix => (percent("Echo Mix", "Mix", 0.0), "echo_mix", "Effects"),
            Param::Waveform => (
                ParamDescriptor::choice("Waveform", "Wave", 4, 2),
                "waveform",
                "Oscillator",
            ),
            Param::FmAmount => (
                ParamDescriptor::new("FM Amount", "FM", 0.0, 10.0, 0.0)
                    .with_scale(ParamScale::Power(2.0)),
                "fm_amount",
                "Oscillator",
            ),
            Param::FmRatio => (
                ParamDescriptor::new("FM Ratio", "Ratio", 0.25, 8.0, 1.0)
                    .with_scale(ParamScale::Logarithmic)
                    .with_unit(ParamUnit::Ratio),
                "fm_ratio",
                "Oscillator",
            ),
            Param::Detune => (
                ParamDescriptor::new("Detune", "Detune", -100.0, 100.0, 0.0)
                    .with_unit(ParamUnit::Cents)
                    .with_precision(1),
                "detune",
                "Oscillator",
            ),
            Param::VelocitySensitivity => (
                percent("Velocity Sensitivity", "Vel", 1.0),
                "velocity_sensitivity",
                "Oscillator",
            ),
            Param::AmpAttack => (seconds("Amp Attack", "A", 0.01), "amp_attack", "Amp Envelope"),
            Param::AmpHold => (seconds("Amp Hold", "H", 0.0), "amp_hold", "Amp Envelope"),
            Param::AmpDecay => (seconds("Amp Decay", "D", 0.2), "amp_decay", "Amp Envelope"),
            Param::AmpSustain => (percent("Amp Sustain", "S", 0.8), "amp_sustain", "Amp Envelope"),
            Param::AmpRelease => (seconds("Amp Release", "R", 0.1), "amp_release", "Amp Envelope"),
            Param::ModAttack => (seconds("Mod Attack", "A", 0.01), "mod_attack", "Mod Envelope"),
            Param::ModHold => (seconds("Mod Hold", "H", 0.0), "mod_hold", "Mod Envelope"),
            Param::ModDecay => (seconds("Mod Decay", "D", 0.3), "mod_decay", "Mod Envelope"),
            Param::ModSustain => (percent("Mod Sustain", "S", 0.5), "mod_sustain", "Mod Envelope"),
            Param::ModRelease => (seconds("Mod Release", "R", 0.2), "mod_release", "Mod Envelope"),
            Param::KeyboardMode => (
                ParamDescriptor::choice("Keyboard Mode", "Keys", KeyboardMode::COUNT as u16, 0),
                "keyboard_mode",
                "Keyboard",
            ),
            Param::Macro1Input => (macro_param("Macro 1 Input", 0.5), "macro1_input", "Macro 1"),
            Param::Macro1Min => (macro_param("Macro 1 Min", 0.0), "macro1_min", "Macro 1"),
            Param::Macro1Max => (macro_param("Macro 1 Max", 1.0), "macro1_max", "Macro 1"),
            Param::Macro1Amount => (macro_param("Macro 1 Amount", 1.0), "macro1_amount", "Macro 1"),
            Param::Macro1Midpoint => (macro_param("Macro 1 Midpoint", 0.5), "macro1_midpoint", "Macro 1"),
            Param::Macro1Distortion => (macro_param("Macro 1 Distortion", 0.0), "macro1_distortion", "Macro 1"),
            Param::Macro1Randomness => (macro_param("Macro 1 Randomness", 0.0), "macro1_randomness", "Macro 1"),
            Param::Macro2Input => (macro_param("Macro 2 Input", 0.5), "macro2_input", "Macro 2"),
            Param::Macro2Min => (macro_param("Macro 2 Min", 0.0), "macro2_min", "Macro 2"),
            Param::Macro2Max => (macro_param("Macro 2 Max", 1.0), "macro2_max", "Macro 2"),
            Param::Macro2Amount => (macro_param("Macro 2 Amount", 1.0), "macro2_amount", "Macro 2"),
            Param::Macro2Midpoint => (macro_param("Macro 2 Midpoint", 0.5), "macro2_midpoint", "Macro 2"),
            Param::Macro2Distortion => (macro_param("Macro 2 Distortion", 0.0), "macro2_distortion", "Macro 2"),
            Param::Macro2Randomness => (macro_param("Macro 2 Randomness", 0.0), "macro2_randomness", "Macro 2"),
        };
        descriptor
            .with_id(ParamId(self as u32), string_id)
            .with_group(group)
    }
}

const fn percent(name: &'static str, short_name: &'static str, default: f32) -> ParamDescriptor {
    ParamDescriptor::new(name, short_name, 0.0, 1.0, default).with_unit(ParamUnit::Percent)
}

// Linear so that normalized automation maps to exact sample counts.
const fn seconds(name: &'static str, short_name: &'static str, default: f32) -> ParamDescriptor {
    ParamDescriptor::new(name, short_name, 0.0, 6.0, default)
        .with_unit(ParamUnit::Seconds)
        .with_precision(3)
}

// Macro inputs are not themselves assignable, so macros cannot form cycles.
const fn macro_param(name: &'static str, default: f32) -> ParamDescriptor {
    ParamDescriptor::new(name, name, 0.0, 1.0, default).with_flags(ParamFlags::AUTOMATABLE)
}
