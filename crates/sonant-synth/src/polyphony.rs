//! Voice allocation, note routing and the voice mixer.
//!
//! [`Polyphony`] owns a fixed pool of [`Voice`]s. Note messages are turned
//! into events scheduled on the voices at the note's sample offset, so a
//! voice's lookup state (channel, note, lifecycle) changes as soon as the
//! message is handled while its sound changes exactly at the offset.
//!
//! # Allocation
//!
//! A note-on takes the first free voice. When none is free a voice is
//! stolen, in order of preference:
//!
//! 1. the releasing voice whose release started first,
//! 2. among those, the quietest,
//! 3. otherwise the allocated voice that started first.
//!
//! Remaining ties go to the lowest allocation serial.
//!
//! # Keyboard modes
//!
//! [`KeyboardMode`] decides which oscillators a note plays. It is read when
//! the note starts; sounding notes keep their layer.
//!
//! # MPE
//!
//! With an [`MpeConfig`], pitch bend, channel pressure and CC 74 on a member
//! channel are per-note controls for the voices on that channel. Everything
//! else, including the master channel, stays channel-wide.

use sonant_core::{BlockContext, ProducerCore, SampleBuffer, SignalProducer, produce};

use crate::config::{EngineConfig, MpeConfig, RetriggerPolicy};
use crate::midi::ExpressionKind;
use crate::voice::{Voice, VoiceInputs, VoiceLayer, VoiceState};

const CHANNELS: usize = 16;

/// How notes are spread over a voice's two oscillators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyboardMode {
    /// Every note plays the carrier, phase-modulated by the modulator.
    #[default]
    MixAndMod,
    /// Notes below the key play the modulator alone, the others the
    /// carrier alone.
    Split(u8),
}

impl KeyboardMode {
    /// Number of modes: mix-and-mod, then splits at every key from C3 to C4.
    pub const COUNT: usize = 14;

    /// C3.
    const LOWEST_SPLIT: u8 = 48;

    /// Mode for a choice index; out-of-range indices clamp to the last split.
    pub fn from_index(index: usize) -> Self {
        match index.min(Self::COUNT - 1) {
            0 => KeyboardMode::MixAndMod,
            split => KeyboardMode::Split(Self::LOWEST_SPLIT + split as u8 - 1),
        }
    }

    /// Layer a note starting under this mode plays.
    pub fn layer_for(self, note: u8) -> VoiceLayer {
        match self {
            KeyboardMode::MixAndMod => VoiceLayer::Both,
            KeyboardMode::Split(split) if note < split => VoiceLayer::Modulator,
            KeyboardMode::Split(_) => VoiceLayer::Carrier,
        }
    }
}

/// Last per-note controls seen on each MPE member channel.
#[derive(Debug, Clone, Copy)]
struct MemberState {
    bend: [f32; CHANNELS],
    pressure: [f32; CHANNELS],
    brightness: [f32; CHANNELS],
}

impl Default for MemberState {
    fn default() -> Self {
        Self {
            bend: [0.0; CHANNELS],
            pressure: [ExpressionKind::Pressure.neutral(); CHANNELS],
            brightness: [ExpressionKind::Brightness.neutral(); CHANNELS],
        }
    }
}

/// The polyphonic voice pool and its stereo mix.
#[derive(Debug)]
pub struct Polyphony {
    core: ProducerCore,
    voices: Vec<Voice>,
    retrigger: RetriggerPolicy,
    mpe: Option<MpeConfig>,
    next_serial: u64,
    next_release: u64,
    sustain: bool,
    members: MemberState,
    inputs: VoiceInputs,
    keyboard_mode: KeyboardMode,
}

impl Polyphony {
    /// A pool of `config.polyphony` free voices.
    pub fn new(config: &EngineConfig) -> Self {
        let voices = (0..config.polyphony)
            .map(|_| Voice::new(config.event_queue_capacity, config.steal_fade_samples))
            .collect();
        Self {
            core: ProducerCore::with_queue_capacity(2, config.event_queue_capacity),
            voices,
            retrigger: config.retrigger,
            mpe: config.mpe,
            next_serial: 0,
            next_release: 0,
            sustain: false,
            members: MemberState::default(),
            inputs: VoiceInputs::default(),
            keyboard_mode: KeyboardMode::default(),
        }
    }

    /// Every voice slot, free or not.
    pub fn voices(&self) -> &[Voice] {
        &self.voices
    }

    /// Voices that are allocated or releasing.
    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| !v.is_free()).count()
    }

    /// Whether the sustain pedal is down.
    pub fn is_sustain_down(&self) -> bool {
        self.sustain
    }

    /// Shared settings applied to every voice.
    pub fn voice_inputs(&self) -> &VoiceInputs {
        &self.inputs
    }

    /// Replaces the shared voice settings.
    pub fn set_voice_inputs(&mut self, inputs: &VoiceInputs) {
        self.inputs = *inputs;
        for voice in &mut self.voices {
            voice.set_inputs(inputs);
        }
    }

    /// Keyboard mode applied to new notes.
    pub fn keyboard_mode(&self) -> KeyboardMode {
        self.keyboard_mode
    }

    /// Sets the keyboard mode for notes started from now on.
    pub fn set_keyboard_mode(&mut self, mode: KeyboardMode) {
        self.keyboard_mode = mode;
    }

    /// Starts a note. Returns the index of the voice that plays it.
    pub fn note_on(&mut self, time_offset: u32, channel: u8, note: u8, velocity: f32) -> usize {
        let layer = self.keyboard_mode.layer_for(note);
        let index = match self.retrigger {
            RetriggerPolicy::Restart => match self.find_sounding(channel, note) {
                Some(index) => {
                    let serial = self.bump_serial();
                    self.voices[index].start(time_offset, channel, note, velocity, layer, serial, true);
                    index
                }
                None => self.allocate(time_offset, channel, note, velocity, layer),
            },
            RetriggerPolicy::Retrigger => {
                if let Some(index) = self.find_held(channel, note) {
                    let stamp = self.bump_release();
                    self.voices[index].release(time_offset, stamp);
                }
                self.allocate(time_offset, channel, note, velocity, layer)
            }
        };
        self.apply_member_state(index, time_offset, channel);
        index
    }

    /// Releases a note, or defers the release while the sustain pedal is
    /// down. Returns `false` when no held voice plays `(channel, note)`.
    pub fn note_off(&mut self, time_offset: u32, channel: u8, note: u8) -> bool {
        let Some(index) = self.find_held(channel, note) else {
            return false;
        };
        if self.sustain {
            self.voices[index].hold_for_sustain();
        } else {
            let stamp = self.bump_release();
            self.voices[index].release(time_offset, stamp);
        }
        true
    }

    /// Sustain pedal. Lifting it releases every deferred note together.
    pub fn set_sustain(&mut self, time_offset: u32, down: bool) {
        if self.sustain == down {
            return;
        }
        self.sustain = down;
        if down {
            return;
        }
        let stamp = self.bump_release();
        for voice in &mut self.voices {
            if voice.state() == VoiceState::Allocated && voice.is_sustained() {
                voice.release(time_offset, stamp);
            }
        }
    }

    /// Releases every held voice, sustained or not.
    pub fn all_notes_off(&mut self, time_offset: u32) {
        let stamp = self.bump_release();
        for voice in &mut self.voices {
            if voice.state() == VoiceState::Allocated {
                voice.release(time_offset, stamp);
            }
        }
    }

    /// Silences every voice without a release tail.
    pub fn all_sound_off(&mut self, time_offset: u32) {
        let stamp = self.bump_release();
        for voice in &mut self.voices {
            if !voice.is_free() {
                voice.kill(time_offset, stamp);
            }
        }
    }

    /// Pitch bend, normalized with the centre at 0.5. Returns `true` when
    /// the message was a per-note bend on an MPE member channel.
    pub fn pitch_bend(&mut self, time_offset: u32, channel: u8, normalized: f32) -> bool {
        let Some(mpe) = self.member_zone(channel) else {
            return false;
        };
        let semitones = (normalized.clamp(0.0, 1.0) * 2.0 - 1.0) * mpe.bend_range;
        self.members.bend[usize::from(channel)] = semitones;
        for voice in self.voices_on(channel) {
            voice.schedule_bend(time_offset, semitones);
        }
        true
    }

    /// Channel pressure. Returns `true` when consumed as per-note pressure.
    pub fn channel_pressure(&mut self, time_offset: u32, channel: u8, normalized: f32) -> bool {
        if self.member_zone(channel).is_none() {
            return false;
        }
        self.members.pressure[usize::from(channel)] = normalized;
        for voice in self.voices_on(channel) {
            voice.schedule_expression(time_offset, ExpressionKind::Pressure, normalized);
        }
        true
    }

    /// CC 74. Returns `true` when consumed as per-note brightness.
    pub fn brightness(&mut self, time_offset: u32, channel: u8, normalized: f32) -> bool {
        if self.member_zone(channel).is_none() {
            return false;
        }
        self.members.brightness[usize::from(channel)] = normalized;
        for voice in self.voices_on(channel) {
            voice.schedule_expression(time_offset, ExpressionKind::Brightness, normalized);
        }
        true
    }

    /// Note expression keyed by `(channel, note)`. Returns `false` when no
    /// voice plays the note.
    pub fn note_expression(&mut self, time_offset: u32, channel: u8, note: u8, kind: ExpressionKind, value: f32) -> bool {
        match self.find_sounding(channel, note) {
            Some(index) => {
                self.voices[index].schedule_expression(time_offset, kind, value);
                true
            }
            None => false,
        }
    }

    fn member_zone(&self, channel: u8) -> Option<MpeConfig> {
        self.mpe.filter(|mpe| mpe.is_member(channel))
    }

    fn voices_on(&mut self, channel: u8) -> impl Iterator<Item = &mut Voice> {
        self.voices
            .iter_mut()
            .filter(move |v| !v.is_free() && v.channel() == channel)
    }

    fn bump_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    fn bump_release(&mut self) -> u64 {
        self.next_release += 1;
        self.next_release
    }

    /// The non-free voice for `(channel, note)`, preferring a held one.
    fn find_sounding(&self, channel: u8, note: u8) -> Option<usize> {
        self.find_held(channel, note).or_else(|| {
            self.voices
                .iter()
                .enumerate()
                .filter(|(_, v)| v.state() == VoiceState::Releasing && v.channel() == channel && v.note() == note)
                .max_by_key(|(_, v)| v.serial())
                .map(|(index, _)| index)
        })
    }

    fn find_held(&self, channel: u8, note: u8) -> Option<usize> {
        self.voices
            .iter()
            .position(|v| v.state() == VoiceState::Allocated && v.channel() == channel && v.note() == note)
    }

    fn allocate(&mut self, time_offset: u32, channel: u8, note: u8, velocity: f32, layer: VoiceLayer) -> usize {
        let serial = self.bump_serial();
        if let Some(index) = self.voices.iter().position(Voice::is_free) {
            self.voices[index].start(time_offset, channel, note, velocity, layer, serial, false);
            return index;
        }

        let index = self.steal_candidate();
        let voice = &mut self.voices[index];
        voice.steal(time_offset);
        voice.start(time_offset, channel, note, velocity, layer, serial, false);
        index
    }

    fn steal_candidate(&self) -> usize {
        let releasing = self
            .voices
            .iter()
            .enumerate()
            .filter(|(_, v)| v.state() == VoiceState::Releasing)
            .min_by(|(_, a), (_, b)| {
                a.release_stamp()
                    .cmp(&b.release_stamp())
                    .then_with(|| a.level().total_cmp(&b.level()))
                    .then_with(|| a.serial().cmp(&b.serial()))
            });
        if let Some((index, _)) = releasing {
            return index;
        }

        self.voices
            .iter()
            .enumerate()
            .min_by_key(|(_, v)| v.serial())
            .map_or(0, |(index, _)| index)
    }

    /// Gives a new note on a member channel the channel's current controls.
    fn apply_member_state(&mut self, index: usize, time_offset: u32, channel: u8) {
        if self.member_zone(channel).is_none() {
            return;
        }
        let ch = usize::from(channel);
        let voice = &mut self.voices[index];
        voice.schedule_bend(time_offset, self.members.bend[ch]);
        voice.schedule_expression(time_offset, ExpressionKind::Pressure, self.members.pressure[ch]);
        voice.schedule_expression(time_offset, ExpressionKind::Brightness, self.members.brightness[ch]);
    }
}

impl SignalProducer for Polyphony {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProducerCore {
        &mut self.core
    }

    fn initialize_rendering(&mut self, ctx: &BlockContext<'_>) {
        for voice in self.voices.iter_mut().filter(|v| !v.is_free()) {
            produce(voice, ctx);
        }
    }

    fn render(&mut self, _ctx: &BlockContext<'_>, first: usize, last: usize, out: &mut SampleBuffer) {
        out.clear_range(first, last);
        for voice in self.voices.iter().filter(|v| !v.is_free()) {
            out.accumulate_range(voice.output(), first, last);
        }
    }

    fn finalize_rendering(&mut self, _ctx: &BlockContext<'_>, _sample_count: usize) {
        for voice in &mut self.voices {
            if voice.release_finished() {
                voice.set_free();
            }
        }
    }

    fn for_each_child(&mut self, visit: &mut dyn FnMut(&mut dyn SignalProducer)) {
        for voice in &mut self.voices {
            visit(voice);
        }
    }

    fn on_reset(&mut self) {
        self.sustain = false;
        self.members = MemberState::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonant_core::Round;

    const SR: f32 = 48000.0;
    const BLOCK: usize = 256;

    fn pool(polyphony: usize, retrigger: RetriggerPolicy) -> Polyphony {
        let config = EngineConfig {
            polyphony,
            retrigger,
            ..EngineConfig::default()
        };
        let mut pool = Polyphony::new(&config);
        pool.configure(SR, BLOCK).unwrap();
        pool
    }

    fn render(pool: &mut Polyphony, round: u64) {
        produce(pool, &BlockContext::new(Round(round), BLOCK, SR));
    }

    #[test]
    fn test_first_free_voice_is_used() {
        let mut pool = pool(4, RetriggerPolicy::Restart);
        assert_eq!(pool.note_on(0, 0, 60, 1.0), 0);
        assert_eq!(pool.note_on(0, 0, 64, 1.0), 1);
        assert_eq!(pool.active_voice_count(), 2);
    }

    #[test]
    fn test_steals_oldest_allocated_when_all_held() {
        let mut pool = pool(2, RetriggerPolicy::Restart);
        pool.note_on(0, 0, 60, 1.0);
        pool.note_on(0, 0, 64, 1.0);
        render(&mut pool, 1);

        let index = pool.note_on(0, 0, 67, 1.0);
        assert_eq!(index, 0);
        assert_eq!(pool.voices()[0].note(), 67);
        assert_eq!(pool.active_voice_count(), 2);
    }

    #[test]
    fn test_prefers_releasing_voice_over_held() {
        let mut pool = pool(3, RetriggerPolicy::Restart);
        pool.note_on(0, 0, 60, 1.0);
        pool.note_on(0, 0, 62, 1.0);
        pool.note_on(0, 0, 64, 1.0);
        render(&mut pool, 1);
        pool.note_off(0, 0, 62);
        render(&mut pool, 2);

        assert_eq!(pool.note_on(0, 0, 67, 1.0), 1);
    }

    #[test]
    fn test_oldest_release_wins_over_quietest() {
        let mut pool = pool(2, RetriggerPolicy::Restart);
        pool.note_on(0, 0, 60, 1.0);
        pool.note_on(0, 0, 62, 1.0);
        render(&mut pool, 1);
        pool.note_off(0, 0, 62);
        pool.note_off(10, 0, 60);
        render(&mut pool, 2);

        assert_eq!(pool.note_on(0, 0, 67, 1.0), 1);
    }

    #[test]
    fn test_restart_reuses_the_sounding_voice() {
        let mut pool = pool(4, RetriggerPolicy::Restart);
        let first = pool.note_on(0, 0, 60, 1.0);
        render(&mut pool, 1);
        let second = pool.note_on(0, 0, 60, 0.5);
        assert_eq!(first, second);
        assert_eq!(pool.active_voice_count(), 1);
    }

    #[test]
    fn test_retrigger_releases_then_allocates() {
        let mut pool = pool(4, RetriggerPolicy::Retrigger);
        let first = pool.note_on(0, 0, 60, 1.0);
        render(&mut pool, 1);
        let second = pool.note_on(0, 0, 60, 1.0);
        assert_ne!(first, second);
        assert_eq!(pool.voices()[first].state(), VoiceState::Releasing);
        assert_eq!(pool.voices()[second].state(), VoiceState::Allocated);

        // Only the newer voice answers the note-off.
        assert!(pool.note_off(0, 0, 60));
        assert!(!pool.note_off(0, 0, 60));
    }

    #[test]
    fn test_sustain_defers_note_off() {
        let mut pool = pool(4, RetriggerPolicy::Restart);
        let index = pool.note_on(0, 0, 60, 1.0);
        pool.set_sustain(0, true);
        assert!(pool.note_off(0, 0, 60));
        assert_eq!(pool.voices()[index].state(), VoiceState::Allocated);
        assert!(pool.voices()[index].is_sustained());

        pool.set_sustain(0, false);
        assert_eq!(pool.voices()[index].state(), VoiceState::Releasing);
    }

    #[test]
    fn test_all_sound_off_frees_within_a_block() {
        let mut pool = pool(4, RetriggerPolicy::Restart);
        pool.note_on(0, 0, 60, 1.0);
        pool.note_on(0, 1, 60, 1.0);
        render(&mut pool, 1);
        pool.all_sound_off(0);
        render(&mut pool, 2);
        assert_eq!(pool.active_voice_count(), 0);
        assert!(pool.output().channel(0).iter().all(|s| s.abs() < 0.05));
    }

    #[test]
    fn test_free_voices_are_not_rendered() {
        let mut pool = pool(4, RetriggerPolicy::Restart);
        pool.note_on(0, 0, 60, 1.0);
        render(&mut pool, 1);
        render(&mut pool, 2);
        assert_eq!(pool.voices()[0].core().render_count(), 2);
        assert!(pool.voices()[1..].iter().all(|v| v.core().render_count() == 0));
    }

    #[test]
    fn test_mpe_routes_member_controls_per_note() {
        let config = EngineConfig {
            polyphony: 4,
            mpe: Some(MpeConfig::lower_zone()),
            ..EngineConfig::default()
        };
        let mut pool = Polyphony::new(&config);
        pool.configure(SR, BLOCK).unwrap();

        let a = pool.note_on(0, 1, 60, 1.0);
        let b = pool.note_on(0, 2, 60, 1.0);
        assert!(pool.channel_pressure(0, 1, 0.75));
        assert!(!pool.channel_pressure(0, 0, 0.75));
        assert!(pool.pitch_bend(0, 2, 1.0));
        render(&mut pool, 1);

        assert_eq!(pool.voices()[a].expression(ExpressionKind::Pressure), 0.75);
        assert_eq!(pool.voices()[b].expression(ExpressionKind::Pressure), 0.0);
        assert_ne!(
            pool.voices()[a].output().channel(0),
            pool.voices()[b].output().channel(0)
        );
    }

    #[test]
    fn test_member_state_applies_to_new_notes() {
        let config = EngineConfig {
            polyphony: 2,
            mpe: Some(MpeConfig::lower_zone()),
            ..EngineConfig::default()
        };
        let mut pool = Polyphony::new(&config);
        pool.configure(SR, BLOCK).unwrap();

        pool.brightness(0, 3, 0.9);
        let index = pool.note_on(0, 3, 64, 1.0);
        render(&mut pool, 1);
        assert!((pool.voices()[index].expression(ExpressionKind::Brightness) - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_note_expression_targets_one_note() {
        let mut pool = pool(4, RetriggerPolicy::Restart);
        let a = pool.note_on(0, 0, 60, 1.0);
        let b = pool.note_on(0, 0, 64, 1.0);
        assert!(pool.note_expression(0, 0, 64, ExpressionKind::Volume, 0.5));
        assert!(!pool.note_expression(0, 0, 65, ExpressionKind::Volume, 0.5));
        render(&mut pool, 1);
        assert_eq!(pool.voices()[a].expression(ExpressionKind::Volume), 1.0);
        assert_eq!(pool.voices()[b].expression(ExpressionKind::Volume), 0.5);
    }

    #[test]
    fn test_keyboard_modes_map_to_split_keys() {
        assert_eq!(KeyboardMode::from_index(0), KeyboardMode::MixAndMod);
        assert_eq!(KeyboardMode::from_index(1), KeyboardMode::Split(48));
        assert_eq!(KeyboardMode::from_index(13), KeyboardMode::Split(60));
        assert_eq!(KeyboardMode::from_index(99), KeyboardMode::Split(60));
    }

    #[test]
    fn test_split_sends_low_keys_to_the_modulator() {
        let mut pool = pool(4, RetriggerPolicy::Restart);
        let mixed = pool.note_on(0, 0, 40, 1.0);
        pool.set_keyboard_mode(KeyboardMode::from_index(1));
        let low = pool.note_on(0, 0, 47, 1.0);
        let high = pool.note_on(0, 0, 48, 1.0);
        render(&mut pool, 1);

        let voices = pool.voices();
        assert_eq!(voices[mixed].layer(), VoiceLayer::Both, "sounding notes keep their layer");
        assert_eq!(voices[low].layer(), VoiceLayer::Modulator);
        assert_eq!(voices[high].layer(), VoiceLayer::Carrier);
    }
}
