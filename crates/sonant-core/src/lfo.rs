//! Low-frequency oscillator producer.
//!
//! Emits a bipolar `[-1, 1]` modulation signal. The rate comes from a
//! [`FloatParam`] child in Hz, or from the host tempo when synced to a
//! [`NoteDivision`]. `START` restarts the phase and runs, `END` stops with
//! silent output, `CANCEL` stops and rewinds. A jump in host time rewinds
//! the phase too; synced LFOs re-align to the bar position instead.

use core::f32::consts::PI;
use libm::{floorf, sinf};

use crate::buffer::SampleBuffer;
use crate::event::{Event, EventTag};
use crate::param::FloatParam;
use crate::param_info::{ParamDescriptor, ParamScale, ParamUnit};
use crate::producer::{BlockContext, ProducerCore, SignalProducer, produce};
use crate::tempo::NoteDivision;

/// LFO waveform.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LfoWaveform {
    /// Sine.
    #[default]
    Sine,
    /// Triangle starting at -1.
    Triangle,
    /// Rising ramp.
    Saw,
    /// +1 for the first half cycle, -1 for the second.
    Square,
    /// A new pseudo-random level every cycle.
    SampleAndHold,
}

impl LfoWaveform {
    /// Every waveform, in parameter order.
    pub const ALL: [LfoWaveform; 5] = [
        LfoWaveform::Sine,
        LfoWaveform::Triangle,
        LfoWaveform::Saw,
        LfoWaveform::Square,
        LfoWaveform::SampleAndHold,
    ];

    /// Waveform for a stepped parameter index; out-of-range indexes clamp.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }
}

/// Rate parameter range shared by every LFO.
pub const LFO_FREQUENCY: ParamDescriptor = ParamDescriptor::new("LFO Rate", "Rate", 0.01, 30.0, 1.0)
    .with_unit(ParamUnit::Hertz)
    .with_scale(ParamScale::Logarithmic);

/// A phase-accumulating LFO.
#[derive(Debug)]
pub struct Lfo {
    core: ProducerCore,
    frequency: FloatParam,
    waveform: LfoWaveform,
    sync: Option<NoteDivision>,
    phase: f32,
    held: f32,
    noise_state: u32,
    running: bool,
    realign: bool,
}

impl Lfo {
    /// Restart from phase zero and run.
    pub const START: EventTag = EventTag(1);

    /// Stop; output is silent until the next `START`.
    pub const END: EventTag = EventTag(2);

    const NOISE_SEED: u32 = 0x9e37_79b9;

    /// A running sine LFO at the default rate.
    pub fn new() -> Self {
        Self {
            core: ProducerCore::new(1),
            frequency: FloatParam::new(LFO_FREQUENCY),
            waveform: LfoWaveform::Sine,
            sync: None,
            phase: 0.0,
            held: 0.0,
            noise_state: Self::NOISE_SEED,
            running: true,
            realign: false,
        }
    }

    /// Rate parameter, for automation or controller following.
    pub fn frequency_mut(&mut self) -> &mut FloatParam {
        &mut self.frequency
    }

    /// Rate parameter.
    pub fn frequency(&self) -> &FloatParam {
        &self.frequency
    }

    /// Selects the waveform.
    pub fn set_waveform(&mut self, waveform: LfoWaveform) {
        self.waveform = waveform;
    }

    /// Current waveform.
    pub fn waveform(&self) -> LfoWaveform {
        self.waveform
    }

    /// Locks the rate to the host tempo, or frees it.
    pub fn set_tempo_sync(&mut self, division: Option<NoteDivision>) {
        self.sync = division;
    }

    /// Active tempo division, if synced.
    pub fn tempo_sync(&self) -> Option<NoteDivision> {
        self.sync
    }

    /// Phase in `[0, 1)`.
    pub fn phase(&self) -> f32 {
        self.phase
    }

    /// Whether the LFO is producing output.
    pub fn is_running(&self) -> bool {
        self.running
    }

    fn rewind(&mut self) {
        self.phase = 0.0;
        self.held = 0.0;
        self.noise_state = Self::NOISE_SEED;
    }

    fn next_noise(&mut self) -> f32 {
        // xorshift32
        let mut x = self.noise_state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.noise_state = x;
        (x as f32 / u32::MAX as f32) * 2.0 - 1.0
    }

    #[inline]
    fn tick(&mut self, increment: f32) -> f32 {
        let phase = self.phase;
        let output = match self.waveform {
            LfoWaveform::Sine => sinf(phase * 2.0 * PI),
            LfoWaveform::Triangle => {
                if phase < 0.5 {
                    4.0 * phase - 1.0
                } else {
                    3.0 - 4.0 * phase
                }
            }
            LfoWaveform::Saw => 2.0 * phase - 1.0,
            LfoWaveform::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
            LfoWaveform::SampleAndHold => {
                if phase == 0.0 {
                    self.held = self.next_noise();
                }
                self.held
            }
        };

        let mut next = phase + increment;
        if next >= 1.0 {
            next -= floorf(next);
            if self.waveform == LfoWaveform::SampleAndHold {
                self.held = self.next_noise();
            }
        }
        self.phase = next;
        output
    }
}

impl Default for Lfo {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalProducer for Lfo {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProducerCore {
        &mut self.core
    }

    fn initialize_rendering(&mut self, ctx: &BlockContext<'_>) {
        produce(&mut self.frequency, ctx);

        if core::mem::take(&mut self.realign) {
            self.rewind();
            if let (Some(division), true) = (self.sync, ctx.transport.playing) {
                let cycles = ctx.transport.position_beats() / division.beats();
                self.phase = (cycles - libm::floor(cycles)) as f32;
            }
        }
    }

    fn handle_event(&mut self, event: &Event) {
        match event.tag {
            Self::START => {
                self.rewind();
                self.running = true;
            }
            Self::END => self.running = false,
            EventTag::CANCEL => {
                self.rewind();
                self.running = false;
            }
            _ => {}
        }
    }

    fn render(&mut self, ctx: &BlockContext<'_>, first: usize, last: usize, out: &mut SampleBuffer) {
        let samples = &mut out.channel_mut(0)[first..last];
        if !self.running {
            samples.fill(0.0);
            return;
        }

        let period = 1.0 / ctx.sample_rate;
        if let Some(division) = self.sync {
            let increment = division.to_hz(ctx.transport.tempo_bpm) * period;
            for sample in samples {
                *sample = self.tick(increment);
            }
        } else if self.frequency.is_constant_in_round() {
            let increment = self.frequency.value() * period;
            for sample in samples {
                *sample = self.tick(increment);
            }
        } else {
            for (i, sample) in (first..last).zip(samples) {
                let increment = self.frequency.output().channel(0)[i] * period;
                *sample = self.tick(increment);
            }
        }
    }

    fn for_each_child(&mut self, visit: &mut dyn FnMut(&mut dyn SignalProducer)) {
        visit(&mut self.frequency);
    }

    fn on_reset(&mut self) {
        self.rewind();
        self.running = true;
    }

    fn on_transport_discontinuity(&mut self) {
        self.realign = true;
    }
}
