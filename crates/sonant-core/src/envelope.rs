//! Linear AHDSR envelope generator.
//!
//! [`Envelope`] is a one-channel producer driven by `START`, `END` and
//! `CANCEL` events:
//!
//! | Stage   | Event / condition        | Next    | Emits               |
//! |---------|--------------------------|---------|---------------------|
//! | Dormant | `START`                  | Attack  | 0                   |
//! | Attack  | peak reached             | Hold    | ramp to 1           |
//! | Hold    | hold time elapsed        | Decay   | 1                   |
//! | Decay   | sustain reached          | Sustain | ramp to sustain     |
//! | Sustain | `END`                    | Release | sustain level       |
//! | Release | 0 reached                | Dormant | ramp to 0           |
//!
//! `END` moves any sounding stage to Release, `START` restarts the attack
//! from the current level, and `CANCEL` drops to Dormant with no tail.
//!
//! Every ramp emits its starting level first and lands exactly on its
//! target after the configured number of samples.

use crate::buffer::SampleBuffer;
use crate::event::{Event, EventTag};
use crate::producer::{BlockContext, ProducerCore, SignalProducer};

/// Envelope stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeStage {
    /// Silent and idle.
    #[default]
    Dormant,
    /// Rising to full level.
    Attack,
    /// Holding full level.
    Hold,
    /// Falling to the sustain level.
    Decay,
    /// Holding the sustain level until `END`.
    Sustain,
    /// Falling to zero.
    Release,
}

/// Times in seconds and the sustain level in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeSettings {
    /// Attack time.
    pub attack: f32,
    /// Hold time.
    pub hold: f32,
    /// Decay time.
    pub decay: f32,
    /// Sustain level.
    pub sustain: f32,
    /// Release time.
    pub release: f32,
}

impl Default for EnvelopeSettings {
    fn default() -> Self {
        Self {
            attack: 0.01,
            hold: 0.0,
            decay: 0.2,
            sustain: 0.7,
            release: 0.3,
        }
    }
}

/// A sample-accurate AHDSR envelope producer.
#[derive(Debug)]
pub struct Envelope {
    core: ProducerCore,
    settings: EnvelopeSettings,
    stage: EnvelopeStage,
    level: f32,
    increment: f32,
    remaining: u32,
}

impl Envelope {
    /// Start (or restart) the attack.
    pub const START: EventTag = EventTag(1);

    /// Begin the release.
    pub const END: EventTag = EventTag(2);

    /// Creates a dormant envelope.
    pub fn new(settings: EnvelopeSettings) -> Self {
        Self {
            core: ProducerCore::new(1),
            settings,
            stage: EnvelopeStage::Dormant,
            level: 0.0,
            increment: 0.0,
            remaining: 0,
        }
    }

    /// Current settings.
    pub fn settings(&self) -> &EnvelopeSettings {
        &self.settings
    }

    /// Replaces the settings. Stages already running keep their slope; the
    /// sustain level applies immediately.
    pub fn set_settings(&mut self, settings: EnvelopeSettings) {
        self.settings = EnvelopeSettings {
            sustain: settings.sustain.clamp(0.0, 1.0),
            ..settings
        };
    }

    /// Current stage.
    pub fn stage(&self) -> EnvelopeStage {
        self.stage
    }

    /// Level the next sample will start from.
    pub fn level(&self) -> f32 {
        self.level
    }

    /// Whether the envelope is idle.
    pub fn is_dormant(&self) -> bool {
        self.stage == EnvelopeStage::Dormant
    }

    /// Schedules `START` at `time_offset`.
    pub fn start(&mut self, time_offset: u32) -> bool {
        self.core.schedule(Event::new(Self::START, time_offset))
    }

    /// Schedules `END` at `time_offset`.
    pub fn end(&mut self, time_offset: u32) -> bool {
        self.core.schedule(Event::new(Self::END, time_offset))
    }

    /// Schedules `CANCEL` at `time_offset`.
    pub fn cancel(&mut self, time_offset: u32) -> bool {
        self.core.schedule(Event::new(EventTag::CANCEL, time_offset))
    }

    fn samples(&self, seconds: f32) -> u32 {
        libm::roundf(seconds.max(0.0) * self.core.sample_rate()) as u32
    }

    fn ramp(&mut self, stage: EnvelopeStage, target: f32, samples: u32) {
        self.stage = stage;
        self.remaining = samples;
        self.increment = (target - self.level) / samples as f32;
    }

    fn enter_attack(&mut self) {
        match self.samples(self.settings.attack) {
            0 => {
                self.level = 1.0;
                self.enter_hold();
            }
            samples => self.ramp(EnvelopeStage::Attack, 1.0, samples),
        }
    }

    fn enter_hold(&mut self) {
        match self.samples(self.settings.hold) {
            0 => self.enter_decay(),
            samples => {
                self.stage = EnvelopeStage::Hold;
                self.remaining = samples;
                self.increment = 0.0;
            }
        }
    }

    fn enter_decay(&mut self) {
        match self.samples(self.settings.decay) {
            0 => {
                self.level = self.settings.sustain;
                self.stage = EnvelopeStage::Sustain;
            }
            samples => self.ramp(EnvelopeStage::Decay, self.settings.sustain, samples),
        }
    }

    fn enter_release(&mut self) {
        match self.samples(self.settings.release) {
            0 => self.go_dormant(),
            samples => self.ramp(EnvelopeStage::Release, 0.0, samples),
        }
    }

    fn go_dormant(&mut self) {
        self.stage = EnvelopeStage::Dormant;
        self.level = 0.0;
        self.remaining = 0;
    }

    /// Called when a timed stage has run out of samples.
    fn finish_stage(&mut self) {
        match self.stage {
            EnvelopeStage::Attack => {
                self.level = 1.0;
                self.enter_hold();
            }
            EnvelopeStage::Hold => self.enter_decay(),
            EnvelopeStage::Decay => {
                self.level = self.settings.sustain;
                self.stage = EnvelopeStage::Sustain;
            }
            EnvelopeStage::Release => self.go_dormant(),
            EnvelopeStage::Dormant | EnvelopeStage::Sustain => {}
        }
    }

    #[inline]
    fn next_sample(&mut self) -> f32 {
        match self.stage {
            EnvelopeStage::Dormant => 0.0,
            EnvelopeStage::Sustain => {
                self.level = self.settings.sustain;
                self.level
            }
            _ => {
                let out = self.level;
                self.level += self.increment;
                self.remaining -= 1;
                if self.remaining == 0 {
                    self.finish_stage();
                }
                out
            }
        }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Self::new(EnvelopeSettings::default())
    }
}

impl SignalProducer for Envelope {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProducerCore {
        &mut self.core
    }

    fn handle_event(&mut self, event: &Event) {
        match event.tag {
            Self::START => self.enter_attack(),
            Self::END => {
                if !self.is_dormant() {
                    self.enter_release();
                }
            }
            EventTag::CANCEL => self.go_dormant(),
            _ => {}
        }
    }

    fn render(&mut self, _ctx: &BlockContext<'_>, first: usize, last: usize, out: &mut SampleBuffer) {
        let samples = &mut out.channel_mut(0)[first..last];
        match self.stage {
            EnvelopeStage::Dormant => samples.fill(0.0),
            EnvelopeStage::Sustain => {
                self.level = self.settings.sustain;
                samples.fill(self.level);
            }
            _ => {
                for sample in samples {
                    *sample = self.next_sample();
                }
            }
        }
    }

    fn on_reset(&mut self) {
        self.go_dormant();
    }
}
