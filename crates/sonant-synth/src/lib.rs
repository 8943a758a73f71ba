//! Sonant Synth - polyphonic subtractive/FM synthesizer built on sonant-core
//!
//! This crate turns the producer graph of `sonant-core` into a playable
//! instrument: a pool of voices with allocation and stealing, an insert
//! filter with LFO modulation, an effects chain, and the [`Synth`] root
//! that a host wrapper drives block by block.
//!
//! # Threads
//!
//! [`Synth::new`] returns the engine together with a [`SynthHandle`]. The
//! engine lives on the audio thread; the handle goes to whatever thread
//! receives host automation, GUI edits or MIDI. They only communicate
//! through lock-free queues and atomic values.
//!
//! ```rust
//! use sonant_core::TransportInfo;
//! use sonant_synth::{EngineConfig, MidiEvent, Param, Synth};
//!
//! let (mut synth, mut handle) = Synth::new(&EngineConfig::default()).unwrap();
//! synth.initialize(48000.0, 128).unwrap();
//!
//! handle.set_parameter(Param::FilterCutoff.id(), 0.6, 0);
//! handle.deliver_midi(MidiEvent::NoteOn { channel: 0, note: 60, velocity: 100 }, 0);
//!
//! let mut left = [0.0f32; 128];
//! let mut right = [0.0f32; 128];
//! synth.render(&mut left, &mut right, &TransportInfo::stopped());
//! ```
//!
//! # Components
//!
//! - [`Voice`] - Carrier and modulator oscillators with AHDSR envelopes
//! - [`Polyphony`] - Voice pool, stealing, sustain, MPE routing, mixer
//! - [`FilterStage`] - Biquad with LFO-modulated cutoff
//! - [`EffectsChain`] - Distortion, echo and master volume
//! - [`Synth`] / [`SynthHandle`] - Root and control-thread handle
//! - [`Param`] - The fixed parameter table
//! - [`ControllerSource`] - What a parameter can follow
//! - [`EngineConfig`] - TOML-loadable engine settings

pub mod config;
pub mod effects;
pub mod error;
pub mod filter;
pub mod handle;
pub mod midi;
pub mod oscillator;
pub mod params;
pub mod polyphony;
pub mod routing;
pub mod synth;
pub mod voice;

pub use config::{EngineConfig, MpeConfig, RetriggerPolicy};
pub use effects::{EffectsChain, distort};
pub use error::EngineError;
pub use filter::FilterStage;
pub use handle::SynthHandle;
pub use midi::{ExpressionKind, MidiEvent, normalize_7bit, normalize_pitch_bend};
pub use oscillator::{Oscillator, Waveform, cents_to_ratio, note_frequency};
pub use params::{MACRO_COUNT, PARAM_COUNT, Param, ParamRate};
pub use polyphony::{KeyboardMode, Polyphony};
pub use routing::{CONTROLLER_COUNT, ControllerSource};
pub use synth::Synth;
pub use voice::{Voice, VoiceInputs, VoiceLayer, VoiceState};
