//! Insert filter with LFO cutoff modulation.

use sonant_core::{
    Biquad, BiquadCoefficients, BlockContext, ChangeTracker, FilterKind, FloatParam, Lfo,
    ProducerCore, SampleBuffer, SignalProducer, produce,
};

use crate::params::Param;

/// A stereo biquad filtering its source.
///
/// Coefficients are cached against the change indexes of the cutoff and
/// resonance parameters. While both are constant for a round and the LFO
/// depth is zero, the filter designs its coefficients at most once per
/// round; otherwise it redesigns them per sample, but only when the
/// modulated cutoff or the resonance actually moved.
#[derive(Debug)]
pub struct FilterStage<S> {
    core: ProducerCore,
    source: S,
    lfo: Lfo,
    cutoff: FloatParam,
    resonance: FloatParam,
    lfo_depth: FloatParam,
    kind: FilterKind,
    kind_changed: bool,
    sections: [Biquad; 2],
    cutoff_tracker: ChangeTracker,
    resonance_tracker: ChangeTracker,
    designed: (f32, f32),
    constant: bool,
}

impl<S: SignalProducer> FilterStage<S> {
    /// Wraps `source` in a low-pass filter at the parameter defaults.
    pub fn new(source: S) -> Self {
        Self {
            core: ProducerCore::new(2),
            source,
            lfo: Lfo::new(),
            cutoff: FloatParam::new(Param::FilterCutoff.descriptor()),
            resonance: FloatParam::new(Param::FilterResonance.descriptor()),
            lfo_depth: FloatParam::new(Param::FilterLfoDepth.descriptor()),
            kind: FilterKind::LowPass,
            kind_changed: true,
            sections: [Biquad::new(), Biquad::new()],
            cutoff_tracker: ChangeTracker::new(),
            resonance_tracker: ChangeTracker::new(),
            designed: (f32::NAN, f32::NAN),
            constant: true,
        }
    }

    /// The filtered producer.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// The filtered producer, mutably.
    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Cutoff in Hz.
    pub fn cutoff_mut(&mut self) -> &mut FloatParam {
        &mut self.cutoff
    }

    /// Cutoff in Hz.
    pub fn cutoff(&self) -> &FloatParam {
        &self.cutoff
    }

    /// Resonance (Q).
    pub fn resonance_mut(&mut self) -> &mut FloatParam {
        &mut self.resonance
    }

    /// LFO depth in octaves.
    pub fn lfo_depth_mut(&mut self) -> &mut FloatParam {
        &mut self.lfo_depth
    }

    /// The cutoff LFO.
    pub fn lfo_mut(&mut self) -> &mut Lfo {
        &mut self.lfo
    }

    /// The cutoff LFO.
    pub fn lfo(&self) -> &Lfo {
        &self.lfo
    }

    /// Selects the response.
    pub fn set_kind(&mut self, kind: FilterKind) {
        if kind != self.kind {
            self.kind = kind;
            self.kind_changed = true;
        }
    }

    /// Current response.
    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// Current coefficients of the left section.
    pub fn coefficients(&self) -> &BiquadCoefficients {
        self.sections[0].coefficients()
    }

    fn design(&mut self, frequency: f32, q: f32) {
        let coefficients = BiquadCoefficients::design(self.kind, frequency, q, self.core.sample_rate());
        for section in &mut self.sections {
            section.set_coefficients(coefficients);
        }
        self.designed = (frequency, q);
    }
}

impl<S: SignalProducer> SignalProducer for FilterStage<S> {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProducerCore {
        &mut self.core
    }

    fn initialize_rendering(&mut self, ctx: &BlockContext<'_>) {
        produce(&mut self.source, ctx);
        produce(&mut self.cutoff, ctx);
        produce(&mut self.resonance, ctx);
        produce(&mut self.lfo_depth, ctx);
        produce(&mut self.lfo, ctx);

        self.constant = self.cutoff.is_constant_in_round()
            && self.resonance.is_constant_in_round()
            && self.lfo_depth.is_constant_in_round()
            && self.lfo_depth.value() == 0.0;

        if self.constant {
            let cutoff_moved = self.cutoff_tracker.refresh(self.cutoff.change_index());
            let resonance_moved = self.resonance_tracker.refresh(self.resonance.change_index());
            if cutoff_moved || resonance_moved || core::mem::take(&mut self.kind_changed) {
                self.design(self.cutoff.value(), self.resonance.value());
            }
        } else {
            self.cutoff_tracker.invalidate();
            self.resonance_tracker.invalidate();
        }
    }

    fn render(&mut self, _ctx: &BlockContext<'_>, first: usize, last: usize, out: &mut SampleBuffer) {
        let input = self.source.output();
        let right_channel = usize::from(input.channel_count() > 1);
        let (left, right) = out.stereo_mut();

        if self.constant {
            let [left_section, right_section] = &mut self.sections;
            for i in first..last {
                left[i] = left_section.process(input.channel(0)[i]);
                right[i] = right_section.process(input.channel(right_channel)[i]);
            }
            return;
        }

        let cutoff = self.cutoff.output().channel(0);
        let resonance = self.resonance.output().channel(0);
        let depth = self.lfo_depth.output().channel(0);
        let lfo = self.lfo.output().channel(0);
        let kind_changed = core::mem::take(&mut self.kind_changed);
        if kind_changed {
            self.designed = (f32::NAN, f32::NAN);
        }

        for i in first..last {
            let frequency = cutoff[i] * libm::exp2f(depth[i] * lfo[i]);
            let q = resonance[i];
            if (frequency, q) != self.designed {
                let coefficients = BiquadCoefficients::design(self.kind, frequency, q, self.core.sample_rate());
                for section in &mut self.sections {
                    section.set_coefficients(coefficients);
                }
                self.designed = (frequency, q);
            }
            left[i] = self.sections[0].process(input.channel(0)[i]);
            right[i] = self.sections[1].process(input.channel(right_channel)[i]);
        }
    }

    fn for_each_child(&mut self, visit: &mut dyn FnMut(&mut dyn SignalProducer)) {
        visit(&mut self.source);
        visit(&mut self.lfo);
        visit(&mut self.cutoff);
        visit(&mut self.resonance);
        visit(&mut self.lfo_depth);
    }

    fn on_reset(&mut self) {
        for section in &mut self.sections {
            section.clear();
        }
        self.cutoff_tracker.invalidate();
        self.resonance_tracker.invalidate();
        self.kind_changed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sonant_core::{ControllerBank, MidiController, Round};

    const SR: f32 = 48000.0;

    /// Deterministic stereo noise.
    struct Noise {
        core: ProducerCore,
        state: u32,
    }

    impl Noise {
        fn new() -> Self {
            Self {
                core: ProducerCore::new(2),
                state: 0x1234_5678,
            }
        }
    }

    impl SignalProducer for Noise {
        fn core(&self) -> &ProducerCore {
            &self.core
        }

        fn core_mut(&mut self) -> &mut ProducerCore {
            &mut self.core
        }

        fn render(&mut self, _ctx: &BlockContext<'_>, first: usize, last: usize, out: &mut SampleBuffer) {
            for i in first..last {
                self.state ^= self.state << 13;
                self.state ^= self.state >> 17;
                self.state ^= self.state << 5;
                let sample = (self.state as f32 / u32::MAX as f32) * 2.0 - 1.0;
                out.channel_mut(0)[i] = sample;
                out.channel_mut(1)[i] = -sample;
            }
        }
    }

    fn reference(samples: &[f32], switch_at: usize, before: f32, after: f32, q: f32) -> Vec<f32> {
        let mut filter = Biquad::new();
        filter.set_coefficients(BiquadCoefficients::design(FilterKind::LowPass, before, q, SR));
        samples
            .iter()
            .enumerate()
            .map(|(i, &x)| {
                if i == switch_at {
                    filter.set_coefficients(BiquadCoefficients::design(FilterKind::LowPass, after, q, SR));
                }
                filter.process(x)
            })
            .collect()
    }

    #[test]
    fn test_sample_accurate_cutoff_automation() {
        let mut bank = ControllerBank::new();
        let cutoff = bank.add(MidiController::new(0.0));
        bank.configure(SR, 128).unwrap();

        let mut stage = FilterStage::new(Noise::new());
        stage.configure(SR, 128).unwrap();
        stage.cutoff_mut().set_value(20.0);
        stage.cutoff_mut().follow(Some(cutoff));

        bank.get_mut(cutoff).unwrap().change_at(64, 1.0);
        bank.render(Round(1), 128, SR);
        let ctx = BlockContext::new(Round(1), 128, SR).with_controllers(bank.as_slice());
        let out = produce(&mut stage, &ctx).channel(0).to_vec();

        let input = stage.source().output().channel(0).to_vec();
        let q = Param::FilterResonance.descriptor().default;
        let expected = reference(&input, 64, 20.0, stage.cutoff().value(), q);
        assert_eq!(out, expected);
    }

    #[test]
    fn test_constant_cutoff_designs_once() {
        let mut stage = FilterStage::new(Noise::new());
        stage.configure(SR, 64).unwrap();
        stage.cutoff_mut().set_value(500.0);

        produce(&mut stage, &BlockContext::new(Round(1), 64, SR));
        let designed = *stage.coefficients();
        assert_eq!(designed, BiquadCoefficients::design(FilterKind::LowPass, 500.0, stage.resonance.value(), SR));

        // Nothing moved, so the cached design is reused.
        produce(&mut stage, &BlockContext::new(Round(2), 64, SR));
        assert_eq!(*stage.coefficients(), designed);
        assert!(!stage.cutoff_tracker.is_stale(stage.cutoff().change_index()));
    }

    #[test]
    fn test_kind_change_redesigns() {
        let mut stage = FilterStage::new(Noise::new());
        stage.configure(SR, 64).unwrap();
        produce(&mut stage, &BlockContext::new(Round(1), 64, SR));
        let low = *stage.coefficients();

        stage.set_kind(FilterKind::HighPass);
        produce(&mut stage, &BlockContext::new(Round(2), 64, SR));
        assert_ne!(*stage.coefficients(), low);
    }

    #[test]
    fn test_lfo_depth_modulates_the_cutoff() {
        let mut stage = FilterStage::new(Noise::new());
        stage.configure(SR, 256).unwrap();
        stage.cutoff_mut().set_value(1000.0);
        stage.lfo_depth_mut().set_value(2.0);
        stage.lfo_mut().frequency_mut().set_value(30.0);

        produce(&mut stage, &BlockContext::new(Round(1), 256, SR));
        let first = *stage.coefficients();
        produce(&mut stage, &BlockContext::new(Round(2), 256, SR));
        assert_ne!(*stage.coefficients(), first);
        assert!(stage.output().channel(0).iter().all(|s| s.is_finite()));
    }
}
