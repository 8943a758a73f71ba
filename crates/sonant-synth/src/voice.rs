//! A single synthesizer voice.
//!
//! A voice is a stereo producer built from a carrier oscillator, a
//! modulator oscillator (phase modulation), an amplitude envelope and a
//! modulation envelope. A note may play both oscillators or only one of
//! them, see [`VoiceLayer`]. The voice manager drives it by scheduling events at
//! sample offsets; everything audible changes at those offsets, while the
//! bookkeeping the manager needs for lookups changes immediately.

use std::collections::TryReserveError;
use std::f32::consts::FRAC_PI_4;

use sonant_core::{
    BlockContext, Envelope, EnvelopeSettings, Event, EventTag, ProducerCore, SampleBuffer,
    SignalProducer, produce,
};

use crate::midi::ExpressionKind;
use crate::oscillator::{Oscillator, Waveform, cents_to_ratio, note_frequency};
use crate::params::Param;

/// Radians of extra modulation depth at full pressure.
const PRESSURE_FM_DEPTH: f32 = 2.0;

/// Lifecycle of a voice slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceState {
    /// Silent and available.
    #[default]
    Free,
    /// Playing a held (or sustained) note.
    Allocated,
    /// Note released; the amplitude envelope is running out.
    Releasing,
}

/// Which oscillators a note plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VoiceLayer {
    /// The carrier, phase-modulated by the modulator.
    #[default]
    Both,
    /// The carrier alone, unmodulated.
    Carrier,
    /// The modulator alone, heard directly.
    Modulator,
}

impl VoiceLayer {
    const ALL: [VoiceLayer; 3] = [VoiceLayer::Both, VoiceLayer::Carrier, VoiceLayer::Modulator];
}

/// Control-rate settings shared by every voice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VoiceInputs {
    /// Carrier waveform.
    pub waveform: Waveform,
    /// Peak phase-modulation depth in radians.
    pub fm_amount: f32,
    /// Modulator frequency as a multiple of the carrier.
    pub fm_ratio: f32,
    /// Carrier detune in cents.
    pub detune_cents: f32,
    /// 0 ignores velocity, 1 scales amplitude by velocity.
    pub velocity_sensitivity: f32,
    /// Amplitude envelope.
    pub amp: EnvelopeSettings,
    /// Modulation envelope.
    pub modulation: EnvelopeSettings,
    /// Channel-wide pitch bend in semitones.
    pub bend_semitones: f32,
}

impl Default for VoiceInputs {
    fn default() -> Self {
        let default = |param: Param| param.descriptor().default;
        Self {
            waveform: Waveform::from_index(default(Param::Waveform) as usize),
            fm_amount: default(Param::FmAmount),
            fm_ratio: default(Param::FmRatio),
            detune_cents: default(Param::Detune),
            velocity_sensitivity: default(Param::VelocitySensitivity),
            amp: EnvelopeSettings {
                attack: default(Param::AmpAttack),
                hold: default(Param::AmpHold),
                decay: default(Param::AmpDecay),
                sustain: default(Param::AmpSustain),
                release: default(Param::AmpRelease),
            },
            modulation: EnvelopeSettings {
                attack: default(Param::ModAttack),
                hold: default(Param::ModHold),
                decay: default(Param::ModDecay),
                sustain: default(Param::ModSustain),
                release: default(Param::ModRelease),
            },
            bend_semitones: 0.0,
        }
    }
}

/// Linear fade of the output a voice had when it was stolen.
#[derive(Debug, Clone, Copy, Default)]
struct StealFade {
    remaining: u32,
    level: [f32; 2],
    step: [f32; 2],
}

impl StealFade {
    fn begin(&mut self, from: [f32; 2], samples: u32) {
        if samples == 0 {
            *self = Self::default();
            return;
        }
        self.remaining = samples;
        self.level = from;
        self.step = from.map(|v| v / samples as f32);
    }

    #[inline]
    fn next(&mut self) -> [f32; 2] {
        if self.remaining == 0 {
            return [0.0; 2];
        }
        self.remaining -= 1;
        for (level, step) in self.level.iter_mut().zip(self.step) {
            *level -= step;
        }
        if self.remaining == 0 {
            self.level = [0.0; 2];
        }
        self.level
    }
}

/// One polyphonic slot.
#[derive(Debug)]
pub struct Voice {
    core: ProducerCore,
    carrier: Oscillator,
    modulator: Oscillator,
    amp_env: Envelope,
    mod_env: Envelope,

    // Manager bookkeeping, updated when events are scheduled.
    state: VoiceState,
    channel: u8,
    note: u8,
    serial: u64,
    release_stamp: u64,
    sustained: bool,

    // Sounding state, updated when events are dispatched.
    sounding_note: f32,
    velocity: f32,
    layer: VoiceLayer,
    expressions: [f32; 5],
    member_bend: f32,
    inputs: VoiceInputs,
    gain: f32,
    pan: [f32; 2],
    fm_depth: f32,
    fade: StealFade,
    fade_samples: u32,
    last: [f32; 2],
}

impl Voice {
    /// Note-on. `int_param` holds `note | channel << 8 | layer << 16`,
    /// `number_param` the
    /// velocity in `[0, 1]`, `aux` is 1 when the note restarts a sounding
    /// voice and keeps the oscillator phases.
    pub const NOTE_ON: EventTag = EventTag(1);

    /// The voice was taken over by another note; fade out what it was playing.
    pub const STOLEN: EventTag = EventTag(2);

    /// Per-note expression. `int_param` indexes [`ExpressionKind::ALL`].
    pub const EXPRESSION: EventTag = EventTag(3);

    /// Per-note pitch bend in semitones.
    pub const BEND: EventTag = EventTag(4);

    /// A free voice with the given queue capacity and steal fade length.
    pub fn new(queue_capacity: usize, fade_samples: u32) -> Self {
        let inputs = VoiceInputs::default();
        let mut voice = Self {
            core: ProducerCore::with_queue_capacity(2, queue_capacity),
            carrier: Oscillator::default(),
            modulator: Oscillator::default(),
            amp_env: Envelope::new(inputs.amp),
            mod_env: Envelope::new(inputs.modulation),
            state: VoiceState::Free,
            channel: 0,
            note: 0,
            serial: 0,
            release_stamp: 0,
            sustained: false,
            sounding_note: 60.0,
            velocity: 0.0,
            layer: VoiceLayer::Both,
            expressions: ExpressionKind::ALL.map(ExpressionKind::neutral),
            member_bend: 0.0,
            inputs,
            gain: 0.0,
            pan: [0.0; 2],
            fm_depth: 0.0,
            fade: StealFade::default(),
            fade_samples,
            last: [0.0; 2],
        };
        voice.set_inputs(&inputs);
        voice
    }

    /// Lifecycle state.
    pub fn state(&self) -> VoiceState {
        self.state
    }

    /// Whether the voice is neither allocated nor releasing.
    pub fn is_free(&self) -> bool {
        self.state == VoiceState::Free
    }

    /// MIDI channel of the current note.
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Note number of the current note.
    pub fn note(&self) -> u8 {
        self.note
    }

    /// Allocation order; larger is newer.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Release order; larger is newer. Voices released together share it.
    pub fn release_stamp(&self) -> u64 {
        self.release_stamp
    }

    /// Whether a note-off is being deferred by the sustain pedal.
    pub fn is_sustained(&self) -> bool {
        self.sustained
    }

    /// Oscillators played by the sounding note.
    pub fn layer(&self) -> VoiceLayer {
        self.layer
    }

    /// Amplitude envelope level after the last rendered sample.
    pub fn level(&self) -> f32 {
        self.amp_env.level()
    }

    /// The amplitude envelope.
    pub fn amp_envelope(&self) -> &Envelope {
        &self.amp_env
    }

    /// Control-rate settings in effect.
    pub fn inputs(&self) -> &VoiceInputs {
        &self.inputs
    }

    /// Current value of a per-note expression.
    pub fn expression(&self, kind: ExpressionKind) -> f32 {
        self.expressions[kind as usize]
    }

    /// Applies new shared settings. Envelope stages already running keep
    /// their slope.
    pub fn set_inputs(&mut self, inputs: &VoiceInputs) {
        self.inputs = *inputs;
        self.carrier.set_waveform(inputs.waveform);
        self.modulator.set_waveform(Waveform::Sine);
        self.amp_env.set_settings(inputs.amp);
        self.mod_env.set_settings(inputs.modulation);
        self.update_pitch();
        self.update_gain();
        self.update_fm_depth();
    }

    /// Starts `note` at `time_offset`. With `restart` the envelopes restart
    /// from their current level and the oscillators keep running.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn start(
        &mut self,
        time_offset: u32,
        channel: u8,
        note: u8,
        velocity: f32,
        layer: VoiceLayer,
        serial: u64,
        restart: bool,
    ) {
        self.state = VoiceState::Allocated;
        self.channel = channel;
        self.note = note;
        self.serial = serial;
        self.sustained = false;

        let packed = i32::from(note) | (i32::from(channel) << 8) | ((layer as i32) << 16);
        let event = Event::with_value(Self::NOTE_ON, time_offset, velocity.clamp(0.0, 1.0))
            .int(packed)
            .aux(if restart { 1.0 } else { 0.0 });
        self.core.schedule(event);
        self.amp_env.start(time_offset);
        self.mod_env.start(time_offset);
    }

    /// Hands the voice over to a new note at `time_offset`. Must be followed
    /// by [`start`](Self::start).
    pub(crate) fn steal(&mut self, time_offset: u32) {
        self.core.schedule(Event::new(Self::STOLEN, time_offset));
        self.amp_env.cancel(time_offset);
        self.mod_env.cancel(time_offset);
    }

    /// Begins the release at `time_offset`.
    pub(crate) fn release(&mut self, time_offset: u32, stamp: u64) {
        self.state = VoiceState::Releasing;
        self.release_stamp = stamp;
        self.sustained = false;
        self.amp_env.end(time_offset);
        self.mod_env.end(time_offset);
    }

    /// Silences the voice at `time_offset` without a release tail.
    pub(crate) fn kill(&mut self, time_offset: u32, stamp: u64) {
        self.state = VoiceState::Releasing;
        self.release_stamp = stamp;
        self.sustained = false;
        self.amp_env.cancel(time_offset);
        self.mod_env.cancel(time_offset);
    }

    /// Marks a note-off as deferred by the sustain pedal.
    pub(crate) fn hold_for_sustain(&mut self) {
        self.sustained = true;
    }

    /// Schedules a per-note expression change.
    pub(crate) fn schedule_expression(&mut self, time_offset: u32, kind: ExpressionKind, value: f32) {
        self.core
            .schedule(Event::with_value(Self::EXPRESSION, time_offset, kind.clamp(value)).int(kind as i32));
    }

    /// Schedules a per-note pitch bend.
    pub(crate) fn schedule_bend(&mut self, time_offset: u32, semitones: f32) {
        self.core
            .schedule(Event::with_value(Self::BEND, time_offset, semitones));
    }

    /// Whether a releasing voice has gone silent and has nothing pending.
    pub(crate) fn release_finished(&self) -> bool {
        self.state == VoiceState::Releasing
            && self.amp_env.is_dormant()
            && self.amp_env.core().events().is_empty()
            && self.fade.remaining == 0
    }

    pub(crate) fn set_free(&mut self) {
        self.state = VoiceState::Free;
        self.sustained = false;
    }

    fn update_pitch(&mut self) {
        let note = self.sounding_note
            + self.expressions[ExpressionKind::Tuning as usize]
            + self.member_bend
            + self.inputs.bend_semitones;
        let frequency = note_frequency(note) * cents_to_ratio(self.inputs.detune_cents);
        self.carrier.set_frequency(frequency);
        self.modulator.set_frequency(frequency * self.inputs.fm_ratio);
    }

    fn update_gain(&mut self) {
        let sensitivity = self.inputs.velocity_sensitivity.clamp(0.0, 1.0);
        let velocity_gain = 1.0 - sensitivity + sensitivity * self.velocity;
        self.gain = velocity_gain * self.expressions[ExpressionKind::Volume as usize];

        // Constant-power pan.
        let angle = (self.expressions[ExpressionKind::Pan as usize] + 1.0) * FRAC_PI_4;
        self.pan = [libm::cosf(angle), libm::sinf(angle)];
    }

    fn update_fm_depth(&mut self) {
        let pressure = self.expressions[ExpressionKind::Pressure as usize];
        let brightness = self.expressions[ExpressionKind::Brightness as usize];
        self.fm_depth = (self.inputs.fm_amount + pressure * PRESSURE_FM_DEPTH) * 2.0 * brightness;
    }
}

impl SignalProducer for Voice {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProducerCore {
        &mut self.core
    }

    fn initialize_rendering(&mut self, ctx: &BlockContext<'_>) {
        produce(&mut self.amp_env, ctx);
        produce(&mut self.mod_env, ctx);
    }

    fn handle_event(&mut self, event: &Event) {
        match event.tag {
            Self::NOTE_ON => {
                let restart = event.aux != 0.0;
                self.sounding_note = f32::from((event.int_param & 0x7f) as u8);
                self.velocity = event.number_param;
                self.layer = VoiceLayer::ALL
                    .get(((event.int_param >> 16) & 0x3) as usize)
                    .copied()
                    .unwrap_or_default();
                if !restart {
                    self.carrier.reset();
                    self.modulator.reset();
                    self.expressions = ExpressionKind::ALL.map(ExpressionKind::neutral);
                    self.member_bend = 0.0;
                }
                self.update_pitch();
                self.update_gain();
                self.update_fm_depth();
            }
            Self::STOLEN => self.fade.begin(self.last, self.fade_samples),
            Self::EXPRESSION => {
                if let Some(&kind) = ExpressionKind::ALL.get(event.int_param as usize) {
                    self.expressions[kind as usize] = kind.clamp(event.number_param);
                    match kind {
                        ExpressionKind::Tuning => self.update_pitch(),
                        ExpressionKind::Volume | ExpressionKind::Pan => self.update_gain(),
                        ExpressionKind::Pressure | ExpressionKind::Brightness => self.update_fm_depth(),
                    }
                }
            }
            Self::BEND => {
                self.member_bend = event.number_param;
                self.update_pitch();
            }
            _ => {}
        }
    }

    fn render(&mut self, _ctx: &BlockContext<'_>, first: usize, last: usize, out: &mut SampleBuffer) {
        let amp = self.amp_env.output().channel(0);
        let modulation = self.mod_env.output().channel(0);
        let (left, right) = out.stereo_mut();
        let [pan_left, pan_right] = self.pan;

        for i in first..last {
            let oscillator = match self.layer {
                VoiceLayer::Both if self.fm_depth != 0.0 => {
                    let phase_mod = self.modulator.advance() * self.fm_depth * modulation[i];
                    self.carrier.advance_pm(phase_mod)
                }
                VoiceLayer::Both | VoiceLayer::Carrier => self.carrier.advance_pm(0.0),
                VoiceLayer::Modulator => self.modulator.advance(),
            };
            let sample = oscillator * amp[i] * self.gain;
            let [fade_left, fade_right] = self.fade.next();
            left[i] = sample * pan_left + fade_left;
            right[i] = sample * pan_right + fade_right;
        }

        if last > first {
            self.last = [left[last - 1], right[last - 1]];
        }
    }

    fn for_each_child(&mut self, visit: &mut dyn FnMut(&mut dyn SignalProducer)) {
        visit(&mut self.amp_env);
        visit(&mut self.mod_env);
    }

    fn on_configure(&mut self) -> Result<(), TryReserveError> {
        let sample_rate = self.core.sample_rate();
        self.carrier.set_sample_rate(sample_rate);
        self.modulator.set_sample_rate(sample_rate);
        Ok(())
    }

    fn on_reset(&mut self) {
        self.set_free();
        self.carrier.reset();
        self.modulator.reset();
        self.fade = StealFade::default();
        self.last = [0.0; 2];
        self.expressions = ExpressionKind::ALL.map(ExpressionKind::neutral);
        self.member_bend = 0.0;
        self.update_pitch();
        self.update_gain();
        self.update_fm_depth();
    }
}
