//! Peak envelope follower producer.

use libm::expf;

use crate::buffer::SampleBuffer;
use crate::producer::{BlockContext, ProducerCore, SignalProducer, produce};

/// Tracks the peak amplitude of its source across all channels.
///
/// The follower owns its source and renders it first, so wrapping the last
/// stage of a graph in a `Follower` both renders the graph and meters it.
/// The source's own output stays available through
/// [`source`](Self::source).
#[derive(Debug)]
pub struct Follower<S> {
    core: ProducerCore,
    source: S,
    level: f32,
    attack_ms: f32,
    release_ms: f32,
    attack_coeff: f32,
    release_coeff: f32,
}

impl<S: SignalProducer> Follower<S> {
    /// Follows `source` with 10 ms attack and 100 ms release.
    pub fn new(source: S) -> Self {
        Self::with_times(source, 10.0, 100.0)
    }

    /// Follows `source` with explicit attack and release times.
    pub fn with_times(source: S, attack_ms: f32, release_ms: f32) -> Self {
        let mut follower = Self {
            core: ProducerCore::new(1),
            source,
            level: 0.0,
            attack_ms: attack_ms.max(0.1),
            release_ms: release_ms.max(1.0),
            attack_coeff: 0.0,
            release_coeff: 0.0,
        };
        follower.recalculate_coefficients();
        follower
    }

    /// The followed producer.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The followed producer, mutably.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Level after the last rendered sample.
    pub fn level(&self) -> f32 {
        self.level
    }

    fn recalculate_coefficients(&mut self) {
        let sample_rate = self.core.sample_rate();
        self.attack_coeff = expf(-1000.0 / (self.attack_ms * sample_rate));
        self.release_coeff = expf(-1000.0 / (self.release_ms * sample_rate));
    }
}

impl<S: SignalProducer> SignalProducer for Follower<S> {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProducerCore {
        &mut self.core
    }

    fn initialize_rendering(&mut self, ctx: &BlockContext<'_>) {
        produce(&mut self.source, ctx);
    }

    fn render(&mut self, _ctx: &BlockContext<'_>, first: usize, last: usize, out: &mut SampleBuffer) {
        let input = self.source.output();
        let channels = input.channel_count();

        for i in first..last {
            let peak = (0..channels)
                .map(|c| input.channel(c)[i].abs())
                .fold(0.0_f32, f32::max);
            let coeff = if peak > self.level {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.level = coeff * self.level + (1.0 - coeff) * peak;
            out.channel_mut(0)[i] = self.level;
        }
    }

    fn for_each_child(&mut self, visit: &mut dyn FnMut(&mut dyn SignalProducer)) {
        visit(&mut self.source);
    }

    fn on_configure(&mut self) -> Result<(), alloc::collections::TryReserveError> {
        self.recalculate_coefficients();
        Ok(())
    }

    fn on_reset(&mut self) {
        self.level = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::FloatParam;
    use crate::param_info::ParamDescriptor;
    use crate::round::Round;

    fn dc(level: f32) -> FloatParam {
        FloatParam::new(ParamDescriptor::new("Dc", "Dc", -1.0, 1.0, level))
    }

    #[test]
    fn rises_towards_source_peak() {
        let mut follower = Follower::new(dc(-0.8));
        follower.configure(48000.0, 4800).unwrap();
        produce(&mut follower, &BlockContext::new(Round(1), 4800, 48000.0));
        assert!((follower.level() - 0.8).abs() < 0.01);
    }

    #[test]
    fn decays_after_silence() {
        let mut follower = Follower::new(dc(1.0));
        follower.configure(48000.0, 4800).unwrap();
        produce(&mut follower, &BlockContext::new(Round(1), 4800, 48000.0));
        let peak = follower.level();

        follower.source_mut().set_value(0.0);
        produce(&mut follower, &BlockContext::new(Round(2), 4800, 48000.0));
        assert!(follower.level() < peak * 0.5);
    }

    #[test]
    fn source_renders_once_per_round() {
        let mut follower = Follower::new(dc(0.5));
        follower.configure(48000.0, 64).unwrap();
        let ctx = BlockContext::new(Round(1), 64, 48000.0);
        produce(&mut follower, &ctx);
        produce(&mut follower, &ctx);
        assert_eq!(follower.source().core().render_count(), 1);
    }
}
