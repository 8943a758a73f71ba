//! Sonant Core - the signal-producer graph behind the sonant synthesizer
//!
//! This crate provides the realtime engine primitives: a pull-based graph of
//! memoized producers, sample-accurate event queues, versioned value sources
//! and the modulators built on top of them. Nothing on the render path
//! allocates, locks or blocks.
//!
//! # Core Abstractions
//!
//! ## Producers
//!
//! - [`SignalProducer`] - Object-safe node contract (render, event, lifecycle hooks)
//! - [`produce`] - Memoized, event-segmented block rendering
//! - [`ProducerCore`] - Buffer, queue and memoization state every producer embeds
//! - [`BlockContext`] - Round, sample count, transport and shared controllers
//!
//! ## Events
//!
//! - [`Event`] / [`EventTag`] - Timestamped control messages
//! - [`EventQueue`] - Sorted, bounded audio-side queue
//! - [`EventSender`] - Lock-free control-thread half (SPSC ring)
//!
//! ## Value Sources
//!
//! - [`MidiController`] / [`ControllerHandle`] / [`ControllerBank`] - Versioned `[0, 1]` values
//! - [`ChangeIndex`] / [`ChangeTracker`] - 31-bit wrapping version counters
//! - [`FloatParam`] - Automatable parameter with ramps and controller following
//! - [`Macro`] - Controller computed from other controllers
//!
//! ## Modulators
//!
//! - [`Envelope`] - Linear AHDSR
//! - [`Lfo`] - Five waveforms, free or tempo-synced
//! - [`Follower`] - Peak envelope follower wrapping any producer
//!
//! ## DSP Building Blocks
//!
//! - [`Biquad`] - RBJ cookbook filter section
//! - [`DelayLine`] - Fractional circular delay
//! - [`SmoothedParam`] - One-pole smoother
//!
//! # no_std Support
//!
//! Only `alloc` is required. Disable the default `std` feature:
//!
//! ```toml
//! [dependencies]
//! sonant-core = { version = "0.1", default-features = false }
//! ```
//!
//! # Design Principles
//!
//! - **Allocate at configure time**: buffers, queues and delay lines are sized once
//! - **Pull, then memoize**: shared upstream nodes render once per round
//! - **Versioned values**: consumers recompute only when a change index moved

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod biquad;
pub mod buffer;
pub mod change_index;
pub mod controller;
pub mod delay;
pub mod envelope;
pub mod event;
pub mod follower;
pub mod lfo;
pub mod macro_source;
pub mod param;
pub mod param_info;
pub mod producer;
pub mod queue;
pub mod round;
pub mod tempo;

pub use biquad::{Biquad, BiquadCoefficients, FilterKind};
pub use buffer::SampleBuffer;
pub use change_index::{AtomicChangeIndex, ChangeIndex, ChangeTracker};
pub use controller::{ControllerBank, ControllerHandle, ControllerId, MidiController};
pub use delay::DelayLine;
pub use envelope::{Envelope, EnvelopeSettings, EnvelopeStage};
pub use event::{Event, EventTag};
pub use follower::Follower;
pub use lfo::{LFO_FREQUENCY, Lfo, LfoWaveform};
pub use macro_source::{Macro, MacroInput};
pub use param::{FloatParam, SmoothedParam};
pub use param_info::{ParamDescriptor, ParamFlags, ParamId, ParamScale, ParamUnit};
pub use producer::{
    BlockContext, DEFAULT_BLOCK_SIZE, DEFAULT_SAMPLE_RATE, ProducerCore, SignalProducer, produce,
};
pub use queue::{DEFAULT_QUEUE_CAPACITY, EventQueue, EventSender};
pub use round::{Round, RoundCounter};
pub use tempo::{NoteDivision, TransportInfo, TransportTracker};
