//! The synth root.
//!
//! [`Synth`] owns the whole graph and the shared controllers:
//!
//! ```text
//! Polyphony ─► FilterStage ─► EffectsChain ─► Follower (level meter)
//!                  ▲
//!                 LFO
//! ```
//!
//! Each host render call is split into chunks of at most the initialized
//! block size. Per chunk the synth advances the round, dispatches the MIDI
//! due in that chunk, renders the controller bank, updates the macros,
//! applies block-rate parameters and renders the graph once.

use ringbuf::traits::{Consumer, Split};
use ringbuf::{HeapCons, HeapRb};
use sonant_core::{
    BlockContext, ChangeTracker, ControllerBank, ControllerId, EventQueue, FilterKind, FloatParam,
    Follower, LfoWaveform, Macro, MacroInput, NoteDivision, RoundCounter, SignalProducer,
    TransportInfo, TransportTracker, produce,
};

use crate::config::EngineConfig;
use crate::effects::EffectsChain;
use crate::error::EngineError;
use crate::filter::FilterStage;
use crate::handle::SynthHandle;
use crate::midi::{
    CC_ALL_NOTES_OFF, CC_ALL_SOUND_OFF, CC_BRIGHTNESS, CC_SUSTAIN, MidiEvent, normalize_7bit,
    normalize_pitch_bend,
};
use crate::oscillator::Waveform;
use crate::params::{MACRO_COUNT, PARAM_COUNT, Param, ParamRate};
use crate::polyphony::{KeyboardMode, Polyphony};
use crate::routing::{Command, ControllerSource, build_bank, is_assignable};
use crate::voice::VoiceInputs;

/// Pending controller assignments between two renders.
const COMMAND_CAPACITY: usize = 64;

type Graph = Follower<EffectsChain<FilterStage<Polyphony>>>;

/// The synthesizer engine, driven from the audio thread.
pub struct Synth {
    config: EngineConfig,
    graph: Graph,
    bank: ControllerBank,
    macros: [Macro; MACRO_COUNT],
    routes: [ControllerId; PARAM_COUNT],
    block_trackers: [ChangeTracker; PARAM_COUNT],
    bend_tracker: ChangeTracker,
    midi: EventQueue,
    commands: HeapCons<Command>,
    rounds: RoundCounter,
    transport: TransportTracker,
    sample_rate: f32,
    max_block_size: usize,
    initialized: bool,
}

impl core::fmt::Debug for Synth {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Synth")
            .field("sample_rate", &self.sample_rate)
            .field("max_block_size", &self.max_block_size)
            .field("initialized", &self.initialized)
            .field("round", &self.rounds.current())
            .field("active_voices", &self.active_voices())
            .finish_non_exhaustive()
    }
}

impl Synth {
    /// Builds the engine and its control-thread handle.
    ///
    /// Voices, controllers and every queue ring are allocated here; audio
    /// buffers are allocated by [`initialize`](Self::initialize).
    pub fn new(config: &EngineConfig) -> Result<(Self, SynthHandle), EngineError> {
        config.validate()?;

        let (bank, param_handles) = build_bank(config);
        let routes = Param::ALL.map(|param| ControllerId(param.index() as u16));
        let graph = Follower::new(EffectsChain::new(FilterStage::new(Polyphony::new(config))));
        let mut midi = EventQueue::new(config.midi_queue_capacity);
        let midi_sender = midi.sender();
        let (command_tx, command_rx) = HeapRb::<Command>::new(COMMAND_CAPACITY).split();

        let macros = core::array::from_fn(|slot| {
            let output = ControllerSource::Macro(slot as u8)
                .controller_id()
                .unwrap_or(ControllerId(0));
            let mut macro_source = Macro::new(output);
            for input in MacroInput::ALL {
                let route = Param::for_macro(slot, input).map(|param| routes[param.index()]);
                macro_source.connect(input, route);
            }
            macro_source
        });

        let mut synth = Self {
            config: config.clone(),
            graph,
            bank,
            macros,
            routes,
            block_trackers: [ChangeTracker::new(); PARAM_COUNT],
            bend_tracker: ChangeTracker::new(),
            midi,
            commands: command_rx,
            rounds: RoundCounter::new(),
            transport: TransportTracker::new(),
            sample_rate: sonant_core::DEFAULT_SAMPLE_RATE,
            max_block_size: 0,
            initialized: false,
        };

        for param in Param::ALL.into_iter().filter(|p| p.rate() == ParamRate::Audio) {
            let route = synth.routes[param.index()];
            let initial = synth.controller_value(route);
            if let Some(float_param) = synth.param_mut(param) {
                float_param.set_ratio(initial);
                float_param.follow(Some(route));
            }
        }
        for macro_source in &mut synth.macros {
            macro_source.update(&mut synth.bank);
        }
        synth.apply_block_params();

        tracing::debug!(
            polyphony = config.polyphony,
            retrigger = ?config.retrigger,
            mpe = config.mpe.is_some(),
            "synth constructed"
        );

        let handle = SynthHandle::new(param_handles, midi_sender, command_tx);
        Ok((synth, handle))
    }

    /// Fixes the session's sample rate and largest block, and allocates
    /// every audio buffer. Not realtime-safe.
    pub fn initialize(&mut self, sample_rate: f32, max_block_size: usize) -> Result<(), EngineError> {
        let (min, max) = (self.config.min_sample_rate, self.config.max_sample_rate);
        if !(sample_rate.is_finite() && (min..=max).contains(&sample_rate)) {
            return Err(EngineError::UnsupportedSampleRate { sample_rate, min, max });
        }
        let limit = self.config.max_block_size_limit;
        if max_block_size == 0 || max_block_size > limit {
            return Err(EngineError::InvalidBlockSize {
                block_size: max_block_size,
                max: limit,
            });
        }

        self.initialized = false;
        self.bank.configure(sample_rate, max_block_size)?;
        self.graph.configure(sample_rate, max_block_size)?;
        self.midi.reserve(self.config.midi_queue_capacity)?;
        self.sample_rate = sample_rate;
        self.max_block_size = max_block_size;
        self.transport.reset();
        self.initialized = true;

        tracing::info!(
            sample_rate,
            max_block_size,
            polyphony = self.config.polyphony,
            "synth initialized"
        );
        Ok(())
    }

    /// Whether [`initialize`](Self::initialize) has succeeded.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Session sample rate.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Largest block rendered in one graph pass.
    pub fn max_block_size(&self) -> usize {
        self.max_block_size
    }

    /// Renders `min(left.len(), right.len())` frames.
    ///
    /// Before [`initialize`](Self::initialize) the outputs are zeroed.
    /// Realtime-safe: never allocates, locks or blocks.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32], transport: &TransportInfo) {
        let frames = left.len().min(right.len());
        if !self.initialized {
            left[..frames].fill(0.0);
            right[..frames].fill(0.0);
            return;
        }

        self.apply_commands();
        self.midi.pull_inbox();

        let clip = self.config.output_clip;
        let mut start = 0;
        while start < frames {
            let len = (frames - start).min(self.max_block_size);
            let round = self.rounds.advance();

            self.dispatch_midi(len);
            self.bank.render(round, len, self.sample_rate);
            for macro_source in &mut self.macros {
                macro_source.update(&mut self.bank);
            }
            self.apply_block_params();

            let chunk_transport = TransportInfo {
                position_seconds: transport.position_seconds + start as f64 / f64::from(self.sample_rate),
                ..*transport
            };
            if self.transport.observe(&chunk_transport, len, self.sample_rate) {
                self.graph.on_transport_discontinuity();
            }

            let ctx = BlockContext::new(round, len, self.sample_rate)
                .with_transport(chunk_transport)
                .with_controllers(self.bank.as_slice());
            produce(&mut self.graph, &ctx);

            let out = self.graph.source().output();
            let chunk = start..start + len;
            for (dst, &src) in left[chunk.clone()].iter_mut().zip(&out.channel(0)[..len]) {
                *dst = src.clamp(-clip, clip);
            }
            for (dst, &src) in right[chunk].iter_mut().zip(&out.channel(1)[..len]) {
                *dst = src.clamp(-clip, clip);
            }

            self.midi.advance(len);
            start += len;
        }
    }

    /// Silences every voice and drops every pending event. Parameter
    /// values and assignments are kept.
    pub fn reset(&mut self) {
        self.graph.reset();
        self.bank.clear_events();
        self.midi.clear();
        self.transport.reset();
        for tracker in &mut self.block_trackers {
            tracker.invalidate();
        }
        self.bend_tracker.invalidate();
    }

    /// Peak level of the output, from an envelope follower.
    pub fn output_level(&self) -> f32 {
        self.graph.level()
    }

    /// Voices currently allocated or releasing.
    pub fn active_voices(&self) -> usize {
        self.polyphony().active_voice_count()
    }

    /// The voice pool.
    pub fn polyphony(&self) -> &Polyphony {
        self.graph.source().source().source()
    }

    /// The insert filter.
    pub fn filter(&self) -> &FilterStage<Polyphony> {
        self.graph.source().source()
    }

    /// The effects chain.
    pub fn effects(&self) -> &EffectsChain<FilterStage<Polyphony>> {
        self.graph.source()
    }

    /// The shared controllers.
    pub fn controllers(&self) -> &ControllerBank {
        &self.bank
    }

    /// Controller `param` currently follows.
    pub fn route(&self, param: Param) -> ControllerId {
        self.routes[param.index()]
    }

    /// Number of graph passes rendered so far.
    pub fn render_count(&self) -> u64 {
        self.graph.core().render_count()
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn polyphony_mut(&mut self) -> &mut Polyphony {
        self.graph.source_mut().source_mut().source_mut()
    }

    /// The sample-accurate parameter backing `param`, if any.
    fn param_mut(&mut self, param: Param) -> Option<&mut FloatParam> {
        let effects = self.graph.source_mut();
        match param {
            Param::FilterCutoff => Some(effects.source_mut().cutoff_mut()),
            Param::FilterResonance => Some(effects.source_mut().resonance_mut()),
            Param::FilterLfoDepth => Some(effects.source_mut().lfo_depth_mut()),
            Param::LfoRate => Some(effects.source_mut().lfo_mut().frequency_mut()),
            _ => effects.param_mut(param),
        }
    }

    fn controller_value(&self, id: ControllerId) -> f32 {
        self.bank.get(id).map_or(0.0, |c| c.value())
    }

    fn plain(&self, param: Param) -> f32 {
        param
            .descriptor()
            .denormalize(self.controller_value(self.routes[param.index()]))
    }

    fn apply_commands(&mut self) {
        while let Some(command) = self.commands.try_pop() {
            match command {
                Command::Assign { param, source } => self.assign(param, source),
            }
        }
    }

    fn assign(&mut self, param: Param, source: Option<ControllerSource>) {
        if !is_assignable(param) {
            return;
        }
        let own = ControllerSource::Param(param);
        let Some(id) = source.unwrap_or(own).controller_id() else {
            return;
        };
        self.routes[param.index()] = id;
        self.block_trackers[param.index()].invalidate();
        if let Some(float_param) = self.param_mut(param) {
            float_param.follow(Some(id));
        }
        if let Some((slot, input)) = param.macro_input() {
            self.macros[slot].connect(input, Some(id));
        }
    }

    /// Recomputes voice, filter and LFO settings from block-rate parameters
    /// whose controller moved.
    fn apply_block_params(&mut self) {
        let mut changed = false;
        for param in Param::ALL {
            if param.rate() != ParamRate::Block || param.macro_input().is_some() {
                continue;
            }
            let index = param.index();
            if let Some(controller) = self.bank.get(self.routes[index]) {
                changed |= self.block_trackers[index].refresh(controller.change_index());
            }
        }
        if let Some(wheel) = ControllerSource::PitchWheel
            .controller_id()
            .and_then(|id| self.bank.get(id))
        {
            changed |= self.bend_tracker.refresh(wheel.change_index());
        }
        if !changed {
            return;
        }

        let wheel = ControllerSource::PitchWheel
            .controller_id()
            .map_or(0.5, |id| self.controller_value(id));
        let envelope = |attack, hold, decay, sustain, release| sonant_core::EnvelopeSettings {
            attack: self.plain(attack),
            hold: self.plain(hold),
            decay: self.plain(decay),
            sustain: self.plain(sustain),
            release: self.plain(release),
        };
        let inputs = VoiceInputs {
            waveform: Waveform::from_index(self.plain(Param::Waveform) as usize),
            fm_amount: self.plain(Param::FmAmount),
            fm_ratio: self.plain(Param::FmRatio),
            detune_cents: self.plain(Param::Detune),
            velocity_sensitivity: self.plain(Param::VelocitySensitivity),
            amp: envelope(
                Param::AmpAttack,
                Param::AmpHold,
                Param::AmpDecay,
                Param::AmpSustain,
                Param::AmpRelease,
            ),
            modulation: envelope(
                Param::ModAttack,
                Param::ModHold,
                Param::ModDecay,
                Param::ModSustain,
                Param::ModRelease,
            ),
            bend_semitones: (wheel * 2.0 - 1.0) * self.config.pitch_bend_range,
        };
        let kind = FilterKind::from_index(self.plain(Param::FilterType) as usize);
        let waveform = LfoWaveform::from_index(self.plain(Param::LfoWaveform) as usize);
        let sync = (self.plain(Param::LfoSync) >= 0.5).then(|| {
            let index = (self.plain(Param::LfoDivision) as usize).min(NoteDivision::ALL.len() - 1);
            NoteDivision::ALL[index]
        });

        if *self.polyphony().voice_inputs() != inputs {
            self.polyphony_mut().set_voice_inputs(&inputs);
        }
        let filter = self.graph.source_mut().source_mut();
        filter.set_kind(kind);
        let lfo = filter.lfo_mut();
        if lfo.waveform() != waveform {
            lfo.set_waveform(waveform);
        }
        if lfo.tempo_sync() != sync {
            lfo.set_tempo_sync(sync);
        }
    }

    /// Applies every MIDI message due in the next `len` samples.
    fn dispatch_midi(&mut self, len: usize) {
        while let Some(event) = self.midi.pop_due(len - 1) {
            let Some(message) = MidiEvent::from_event(&event) else {
                continue;
            };
            let t = event.time_offset;
            match message.normalized() {
                MidiEvent::NoteOn {
                    channel,
                    note,
                    velocity,
                } => {
                    let velocity = normalize_7bit(velocity);
                    let mode = KeyboardMode::from_index(self.plain(Param::KeyboardMode) as usize);
                    let polyphony = self.polyphony_mut();
                    polyphony.set_keyboard_mode(mode);
                    polyphony.note_on(t, channel, note, velocity);
                    self.change_source(ControllerSource::Note, t, normalize_7bit(note));
                    self.change_source(ControllerSource::Velocity, t, velocity);
                }
                MidiEvent::NoteOff { channel, note } => {
                    self.polyphony_mut().note_off(t, channel, note);
                }
                MidiEvent::ControlChange {
                    channel,
                    controller,
                    value,
                } => self.control_change(t, channel, controller, value),
                MidiEvent::PitchBend { channel, value } => {
                    let normalized = normalize_pitch_bend(value);
                    if !self.polyphony_mut().pitch_bend(t, channel, normalized) {
                        self.change_source(ControllerSource::PitchWheel, t, normalized);
                    }
                }
                MidiEvent::ChannelPressure { channel, pressure } => {
                    let normalized = normalize_7bit(pressure);
                    if !self.polyphony_mut().channel_pressure(t, channel, normalized) {
                        self.change_source(ControllerSource::ChannelPressure, t, normalized);
                    }
                }
                MidiEvent::NoteExpression {
                    channel,
                    note,
                    kind,
                    value,
                } => {
                    self.polyphony_mut()
                        .note_expression(t, channel, note, kind, value);
                }
            }
        }
    }

    fn control_change(&mut self, t: u32, channel: u8, controller: u8, value: u8) {
        let normalized = normalize_7bit(value);
        match controller {
            CC_SUSTAIN => self.polyphony_mut().set_sustain(t, value >= 64),
            CC_ALL_SOUND_OFF => {
                self.polyphony_mut().all_sound_off(t);
                return;
            }
            CC_ALL_NOTES_OFF => {
                self.polyphony_mut().all_notes_off(t);
                return;
            }
            CC_BRIGHTNESS if self.polyphony_mut().brightness(t, channel, normalized) => return,
            _ => {}
        }
        self.change_source(ControllerSource::Cc(controller), t, normalized);
    }

    /// Timed change of a MIDI source. Repeats of the current value are
    /// dropped.
    fn change_source(&mut self, source: ControllerSource, t: u32, normalized: f32) {
        let Some(controller) = source.controller_id().and_then(|id| self.bank.get_mut(id)) else {
            return;
        };
        if controller.value() != normalized {
            controller.change_at(t, normalized);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::VoiceState;

    const SR: f32 = 48000.0;

    fn synth(config: &EngineConfig, block: usize) -> (Synth, SynthHandle) {
        let (mut synth, handle) = Synth::new(config).unwrap();
        synth.initialize(SR, block).unwrap();
        (synth, handle)
    }

    fn run(synth: &mut Synth, frames: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        synth.render(&mut left, &mut right, &TransportInfo::stopped());
        (left, right)
    }

    #[test]
    fn test_initialize_rejects_bad_rates_and_blocks() {
        let (mut synth, _handle) = Synth::new(&EngineConfig::default()).unwrap();
        assert!(matches!(
            synth.initialize(1000.0, 128),
            Err(EngineError::UnsupportedSampleRate { .. })
        ));
        assert!(matches!(
            synth.initialize(SR, 0),
            Err(EngineError::InvalidBlockSize { .. })
        ));
        assert!(matches!(
            synth.initialize(SR, 1 << 20),
            Err(EngineError::InvalidBlockSize { .. })
        ));
        assert!(!synth.is_initialized());
        synth.initialize(SR, 128).unwrap();
        assert!(synth.is_initialized());
    }

    #[test]
    fn test_uninitialized_render_is_silent() {
        let (mut synth, mut handle) = Synth::new(&EngineConfig::default()).unwrap();
        handle.deliver_midi(
            MidiEvent::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100,
            },
            0,
        );
        let mut left = vec![1.0; 64];
        let mut right = vec![1.0; 64];
        synth.render(&mut left, &mut right, &TransportInfo::stopped());
        assert!(left.iter().chain(&right).all(|&s| s == 0.0));
    }

    #[test]
    fn test_large_host_blocks_are_chunked() {
        let (mut synth, _handle) = synth(&EngineConfig::default(), 64);
        run(&mut synth, 200);
        assert_eq!(synth.render_count(), 4);
    }

    #[test]
    fn test_cc_assignment_drives_the_cutoff() {
        let (mut synth, mut handle) = synth(&EngineConfig::default(), 128);
        assert!(handle.assign_controller(Param::FilterCutoff, Some(ControllerSource::Cc(1))));
        run(&mut synth, 128);
        assert_eq!(
            synth.route(Param::FilterCutoff),
            ControllerSource::Cc(1).controller_id().unwrap()
        );

        handle.deliver_midi(
            MidiEvent::ControlChange {
                channel: 0,
                controller: 1,
                value: 0,
            },
            0,
        );
        // CC 1 starts at 0, so the repeat is dropped and nothing moves.
        run(&mut synth, 128);
        let index = synth.controllers().get(synth.route(Param::FilterCutoff)).unwrap().change_index();
        assert_eq!(index.raw(), 0);

        handle.deliver_midi(
            MidiEvent::ControlChange {
                channel: 0,
                controller: 1,
                value: 127,
            },
            0,
        );
        for _ in 0..100 {
            run(&mut synth, 128);
        }
        assert!((synth.filter().cutoff().value() - 20000.0).abs() < 1.0);
    }

    #[test]
    fn test_unassign_restores_the_host_controller() {
        let (mut synth, mut handle) = synth(&EngineConfig::default(), 128);
        handle.assign_controller(Param::Volume, Some(ControllerSource::Macro(0)));
        run(&mut synth, 128);
        handle.assign_controller(Param::Volume, None);
        run(&mut synth, 128);
        assert_eq!(synth.route(Param::Volume), ControllerId(Param::Volume.index() as u16));
    }

    #[test]
    fn test_block_params_reach_the_voices() {
        let (mut synth, mut handle) = synth(&EngineConfig::default(), 128);
        let sine = Param::Waveform.descriptor().normalize(0.0);
        handle.set_parameter(Param::Waveform.id(), sine, 0);
        handle.set_parameter(Param::FilterType.id(), 1.0, 0);
        run(&mut synth, 128);
        assert_eq!(synth.polyphony().voice_inputs().waveform, Waveform::Sine);
        assert_eq!(synth.filter().kind(), FilterKind::Notch);
    }

    #[test]
    fn test_pitch_wheel_bends_every_voice() {
        let (mut synth, mut handle) = synth(&EngineConfig::default(), 128);
        handle.deliver_midi(MidiEvent::PitchBend { channel: 0, value: 16383 }, 0);
        run(&mut synth, 128);
        assert!((synth.polyphony().voice_inputs().bend_semitones - 2.0).abs() < 1e-4);
    }

    #[test]
    fn test_all_notes_off_releases() {
        let (mut synth, mut handle) = synth(&EngineConfig::default(), 128);
        for note in [60, 64, 67] {
            handle.deliver_midi(
                MidiEvent::NoteOn {
                    channel: 0,
                    note,
                    velocity: 100,
                },
                0,
            );
        }
        run(&mut synth, 128);
        handle.deliver_midi(
            MidiEvent::ControlChange {
                channel: 0,
                controller: CC_ALL_NOTES_OFF,
                value: 0,
            },
            0,
        );
        run(&mut synth, 128);
        assert!(synth
            .polyphony()
            .voices()
            .iter()
            .all(|v| v.state() != VoiceState::Allocated));
    }

    #[test]
    fn test_reset_keeps_parameter_values() {
        let (mut synth, mut handle) = synth(&EngineConfig::default(), 128);
        handle.set_parameter(Param::FilterCutoff.id(), 0.5, 0);
        handle.deliver_midi(
            MidiEvent::NoteOn {
                channel: 0,
                note: 60,
                velocity: 100,
            },
            0,
        );
        run(&mut synth, 128);
        let cutoff = synth.filter().cutoff().value();

        synth.reset();
        assert_eq!(synth.active_voices(), 0);
        run(&mut synth, 128);
        assert_eq!(synth.filter().cutoff().value(), cutoff);
        assert!((handle.parameter(Param::FilterCutoff.id()).unwrap() - 0.5).abs() < 1e-6);
    }
}
