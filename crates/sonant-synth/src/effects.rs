//! Output effects: distortion, stereo echo and master volume.

use std::collections::TryReserveError;

use sonant_core::{
    BlockContext, DelayLine, FloatParam, ProducerCore, SampleBuffer, SignalProducer, SmoothedParam,
    produce,
};

use crate::params::Param;

/// Smoothing of echo time changes, so automation glides instead of clicking.
const ECHO_TIME_SMOOTHING_MS: f32 = 50.0;

/// Soft-clips `x`, blended in by `drive`. `drive == 0` returns `x` exactly.
#[inline]
pub fn distort(x: f32, drive: f32) -> f32 {
    if drive <= 0.0 {
        return x;
    }
    let shaped = libm::tanhf(x * (1.0 + 9.0 * drive));
    x + drive * (shaped - x)
}

/// The effects chain at the end of the graph.
///
/// Per sample: distortion, then an echo whose feedback stays inside this
/// producer (the graph itself has no cycles), then master volume.
#[derive(Debug)]
pub struct EffectsChain<S> {
    core: ProducerCore,
    source: S,
    volume: FloatParam,
    drive: FloatParam,
    echo_time: FloatParam,
    echo_feedback: FloatParam,
    echo_mix: FloatParam,
    delays: [DelayLine; 2],
    delay_samples: SmoothedParam,
}

impl<S: SignalProducer> EffectsChain<S> {
    /// Wraps `source` with every effect at its default.
    pub fn new(source: S) -> Self {
        Self {
            core: ProducerCore::new(2),
            source,
            volume: FloatParam::new(Param::Volume.descriptor()),
            drive: FloatParam::new(Param::DistortionDrive.descriptor()),
            echo_time: FloatParam::new(Param::EchoTime.descriptor()),
            echo_feedback: FloatParam::new(Param::EchoFeedback.descriptor()),
            echo_mix: FloatParam::new(Param::EchoMix.descriptor()),
            delays: [DelayLine::new(), DelayLine::new()],
            delay_samples: SmoothedParam::new(1.0),
        }
    }

    /// The processed producer.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The processed producer, mutably.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Parameter backing `param`, if it lives in this chain.
    pub fn param_mut(&mut self, param: Param) -> Option<&mut FloatParam> {
        match param {
            Param::Volume => Some(&mut self.volume),
            Param::DistortionDrive => Some(&mut self.drive),
            Param::EchoTime => Some(&mut self.echo_time),
            Param::EchoFeedback => Some(&mut self.echo_feedback),
            Param::EchoMix => Some(&mut self.echo_mix),
            _ => None,
        }
    }

    /// Master volume.
    pub fn volume(&self) -> &FloatParam {
        &self.volume
    }
}

impl<S: SignalProducer> SignalProducer for EffectsChain<S> {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProducerCore {
        &mut self.core
    }

    fn initialize_rendering(&mut self, ctx: &BlockContext<'_>) {
        produce(&mut self.source, ctx);
        produce(&mut self.volume, ctx);
        produce(&mut self.drive, ctx);
        produce(&mut self.echo_time, ctx);
        produce(&mut self.echo_feedback, ctx);
        produce(&mut self.echo_mix, ctx);
    }

    fn render(&mut self, ctx: &BlockContext<'_>, first: usize, last: usize, out: &mut SampleBuffer) {
        let input = self.source.output();
        let right_channel = usize::from(input.channel_count() > 1);
        let volume = self.volume.output().channel(0);
        let drive = self.drive.output().channel(0);
        let time = self.echo_time.output().channel(0);
        let feedback = self.echo_feedback.output().channel(0);
        let mix = self.echo_mix.output().channel(0);
        let (left, right) = out.stereo_mut();

        for i in first..last {
            self.delay_samples.set_target(time[i] * ctx.sample_rate);
            let delay = self.delay_samples.advance();

            let dry = [input.channel(0)[i], input.channel(right_channel)[i]];
            let mut wet = [0.0; 2];
            for (channel, line) in self.delays.iter_mut().enumerate() {
                let driven = distort(dry[channel], drive[i]);
                let echo = line.read(delay);
                line.write(driven + echo * feedback[i]);
                wet[channel] = (driven + mix[i] * echo) * volume[i];
            }
            left[i] = wet[0];
            right[i] = wet[1];
        }
    }

    fn for_each_child(&mut self, visit: &mut dyn FnMut(&mut dyn SignalProducer)) {
        visit(&mut self.source);
        visit(&mut self.volume);
        visit(&mut self.drive);
        visit(&mut self.echo_time);
        visit(&mut self.echo_feedback);
        visit(&mut self.echo_mix);
    }

    fn on_configure(&mut self) -> Result<(), TryReserveError> {
        let sample_rate = self.core.sample_rate();
        let max_delay = libm::ceilf(Param::EchoTime.descriptor().max * sample_rate) as usize + 1;
        for line in &mut self.delays {
            line.allocate(max_delay)?;
        }
        self.delay_samples = SmoothedParam::with_config(
            self.echo_time.value() * sample_rate,
            sample_rate,
            ECHO_TIME_SMOOTHING_MS,
        );
        Ok(())
    }

    fn on_reset(&mut self) {
        for line in &mut self.delays {
            line.clear();
        }
        self.delay_samples
            .set_target(self.echo_time.value() * self.core.sample_rate());
        self.delay_samples.snap_to_target();
    }
}
