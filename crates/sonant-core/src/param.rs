//! Automatable parameters.
//!
//! Two flavours live here:
//!
//! - [`SmoothedParam`] is a plain one-pole smoother for values that are
//!   owned by a single DSP stage (delay times, crossfades).
//! - [`FloatParam`] is a one-channel [`SignalProducer`] carrying a
//!   host-visible value. It accepts sample-accurate `SET_VALUE` and
//!   `LINEAR_RAMP` events, can follow a [`MidiController`] from the shared
//!   bank, and tells consumers whether it stays constant for the current
//!   round so they can skip per-sample work.
//!
//! ```rust
//! use sonant_core::{BlockContext, FloatParam, ParamDescriptor, Round, SignalProducer, produce};
//!
//! let mut gain = FloatParam::new(ParamDescriptor::new("Gain", "Gain", 0.0, 1.0, 0.0));
//! gain.configure(48000.0, 128).unwrap();
//! gain.schedule_value(64, 1.0);
//!
//! let out = produce(&mut gain, &BlockContext::new(Round(1), 128, 48000.0));
//! assert_eq!(out.channel(0)[63], 0.0);
//! assert_eq!(out.channel(0)[64], 1.0);
//! ```
//!
//! [`MidiController`]: crate::MidiController

use libm::expf;

use crate::buffer::SampleBuffer;
use crate::change_index::{ChangeIndex, ChangeTracker};
use crate::controller::ControllerId;
use crate::event::{Event, EventTag};
use crate::param_info::{ParamDescriptor, ParamFlags};
use crate::producer::{BlockContext, ProducerCore, SignalProducer};

/// A value with one-pole smoothing towards its target.
#[derive(Debug, Clone)]
pub struct SmoothedParam {
    current: f32,
    target: f32,
    coeff: f32,
    sample_rate: f32,
    smoothing_time_ms: f32,
}

impl SmoothedParam {
    /// A parameter at `initial` that jumps instantly until a smoothing time is set.
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            coeff: 1.0,
            sample_rate: crate::producer::DEFAULT_SAMPLE_RATE,
            smoothing_time_ms: 0.0,
        }
    }

    /// A parameter with sample rate and time constant already applied.
    pub fn with_config(initial: f32, sample_rate: f32, smoothing_time_ms: f32) -> Self {
        let mut param = Self::new(initial);
        param.sample_rate = sample_rate;
        param.smoothing_time_ms = smoothing_time_ms;
        param.recalculate_coeff();
        param
    }

    /// Moves the target; the current value glides towards it.
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Jumps to `value` with no smoothing.
    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.current = value;
        self.target = value;
    }

    /// Updates the sample rate, keeping the time constant.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.recalculate_coeff();
    }

    /// Sets the time constant in milliseconds. Zero disables smoothing.
    pub fn set_smoothing_time_ms(&mut self, time_ms: f32) {
        self.smoothing_time_ms = time_ms.max(0.0);
        self.recalculate_coeff();
    }

    /// Advances one sample and returns the new value.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        self.current += self.coeff * (self.target - self.current);
        self.current
    }

    /// Current value without advancing.
    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }

    /// The value being approached.
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Whether the value is within 1e-6 of its target.
    #[inline]
    pub fn is_settled(&self) -> bool {
        (self.current - self.target).abs() < 1e-6
    }

    /// Finishes the glide.
    pub fn snap_to_target(&mut self) {
        self.current = self.target;
    }

    fn recalculate_coeff(&mut self) {
        self.coeff = if self.smoothing_time_ms <= 0.0 || self.sample_rate <= 0.0 {
            1.0
        } else {
            let samples = self.smoothing_time_ms * 0.001 * self.sample_rate;
            1.0 - expf(-1.0 / samples)
        };
    }
}

impl Default for SmoothedParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// A host-visible parameter rendered as a one-channel signal.
///
/// Values are kept in plain units; the [`ParamDescriptor`] maps to and from
/// the normalized `[0, 1]` space used by hosts and controllers.
///
/// The [`ChangeIndex`] is bumped whenever an event changes the value or its
/// trajectory, and once more when a ramp lands on its target. Consumers that
/// cache derived state should only trust the cached value while
/// [`is_constant_in_round`](Self::is_constant_in_round) holds.
#[derive(Debug)]
pub struct FloatParam {
    core: ProducerCore,
    descriptor: ParamDescriptor,
    value: f32,
    ramp_target: f32,
    ramp_step: f32,
    ramp_remaining: u32,
    change_index: ChangeIndex,
    controller: Option<ControllerId>,
    tracker: ChangeTracker,
    followed_ratio: f32,
    constant: bool,
}

impl FloatParam {
    /// Jump to `number_param` (plain units).
    pub const SET_VALUE: EventTag = EventTag(1);

    /// Ramp linearly to `number_param` over `aux` seconds.
    pub const LINEAR_RAMP: EventTag = EventTag(2);

    /// Creates a parameter at its default value.
    pub fn new(descriptor: ParamDescriptor) -> Self {
        let value = descriptor.clamp(descriptor.default);
        Self {
            core: ProducerCore::new(1),
            descriptor,
            value,
            ramp_target: value,
            ramp_step: 0.0,
            ramp_remaining: 0,
            change_index: ChangeIndex::INITIAL,
            controller: None,
            tracker: ChangeTracker::new(),
            followed_ratio: descriptor.normalize(value),
            constant: true,
        }
    }

    /// Metadata of this parameter.
    pub fn descriptor(&self) -> &ParamDescriptor {
        &self.descriptor
    }

    /// Value at the end of the last rendered block, or the last value set.
    #[inline]
    pub fn value(&self) -> f32 {
        self.value
    }

    /// [`value`](Self::value), normalized.
    pub fn ratio(&self) -> f32 {
        self.descriptor.normalize(self.value)
    }

    /// Version of the current value.
    #[inline]
    pub fn change_index(&self) -> ChangeIndex {
        self.change_index
    }

    /// Whether every sample of the last rendered round equals
    /// [`value`](Self::value).
    #[inline]
    pub fn is_constant_in_round(&self) -> bool {
        self.constant
    }

    /// Sets the value right away, cancelling any ramp.
    pub fn set_value(&mut self, value: f32) {
        self.apply_value(value);
    }

    /// Sets the value from a normalized ratio right away.
    pub fn set_ratio(&mut self, ratio: f32) {
        self.apply_value(self.descriptor.denormalize(ratio));
    }

    /// Schedules a jump at `time_offset`. Returns `false` if the queue is full.
    pub fn schedule_value(&mut self, time_offset: u32, value: f32) -> bool {
        self.core
            .schedule(Event::with_value(Self::SET_VALUE, time_offset, value))
    }

    /// Schedules a linear ramp starting at `time_offset`.
    pub fn schedule_ramp(&mut self, time_offset: u32, target: f32, seconds: f32) -> bool {
        self.core.schedule(
            Event::with_value(Self::LINEAR_RAMP, time_offset, target).aux(seconds.max(0.0)),
        )
    }

    /// Freezes any running ramp at `time_offset`.
    pub fn cancel(&mut self, time_offset: u32) -> bool {
        self.core.schedule(Event::new(EventTag::CANCEL, time_offset))
    }

    /// Makes the parameter follow a shared controller, or stop following.
    ///
    /// The controller's current value is picked up in the next round.
    pub fn follow(&mut self, controller: Option<ControllerId>) {
        self.controller = controller;
        self.tracker.invalidate();
    }

    /// The controller being followed.
    pub fn followed_controller(&self) -> Option<ControllerId> {
        self.controller
    }

    fn apply_value(&mut self, value: f32) {
        self.value = self.descriptor.clamp(value);
        self.ramp_remaining = 0;
        self.change_index.bump();
    }

    fn follow_to(&mut self, time_offset: u32, ratio: f32, smoothing_seconds: f32) {
        let target = self.descriptor.denormalize(ratio);
        let seconds = if self.descriptor.flags.contains(ParamFlags::STEPPED) {
            0.0
        } else {
            smoothing_seconds * (ratio - self.followed_ratio).abs()
        };
        self.followed_ratio = ratio;

        if seconds > 0.0 {
            self.schedule_ramp(time_offset, target, seconds);
        } else {
            self.schedule_value(time_offset, target);
        }
    }

    fn sync_with_controller(&mut self, ctx: &BlockContext<'_>) {
        let Some(controller) = self.controller.and_then(|id| ctx.controller(id)) else {
            return;
        };
        let smoothing = controller.smoothing_seconds();
        let events = controller.block_events();
        // While later changes are queued the value already holds the last of
        // them, so only dispatched events may move the parameter.
        let pending = controller.has_pending_changes();

        if let Some(last) = events.last() {
            for event in events {
                self.follow_to(event.time_offset, event.number_param, smoothing);
            }
            // An untimed change after the last timed one still wins.
            if !pending && controller.value() != last.number_param {
                self.follow_to(last.time_offset, controller.value(), smoothing);
            }
            self.tracker.refresh(controller.change_index());
        } else if !pending && self.tracker.refresh(controller.change_index()) {
            self.follow_to(0, controller.value(), smoothing);
        }
    }
}

impl SignalProducer for FloatParam {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProducerCore {
        &mut self.core
    }

    fn initialize_rendering(&mut self, ctx: &BlockContext<'_>) {
        self.sync_with_controller(ctx);

        let sample_count = ctx.sample_count.min(self.core.block_size());
        self.constant = self.ramp_remaining == 0
            && self
                .core
                .events()
                .next_offset()
                .is_none_or(|offset| offset >= sample_count);
    }

    fn handle_event(&mut self, event: &Event) {
        match event.tag {
            Self::SET_VALUE => self.apply_value(event.number_param),
            Self::LINEAR_RAMP => {
                let samples = libm::roundf(event.aux * self.core.sample_rate()) as u32;
                let target = self.descriptor.clamp(event.number_param);
                if samples == 0 {
                    self.apply_value(target);
                } else {
                    self.ramp_target = target;
                    self.ramp_step = (target - self.value) / samples as f32;
                    self.ramp_remaining = samples;
                    self.change_index.bump();
                }
            }
            EventTag::CANCEL => {
                if self.ramp_remaining > 0 {
                    self.ramp_remaining = 0;
                    self.change_index.bump();
                }
            }
            _ => {}
        }
    }

    fn render(&mut self, _ctx: &BlockContext<'_>, first: usize, last: usize, out: &mut SampleBuffer) {
        let samples = &mut out.channel_mut(0)[first..last];
        if self.ramp_remaining == 0 {
            samples.fill(self.value);
            return;
        }

        for sample in samples {
            *sample = self.value;
            if self.ramp_remaining > 0 {
                self.ramp_remaining -= 1;
                if self.ramp_remaining == 0 {
                    self.value = self.ramp_target;
                    self.change_index.bump();
                } else {
                    self.value += self.ramp_step;
                }
            }
        }
    }

    fn on_reset(&mut self) {
        self.ramp_remaining = 0;
        self.tracker.invalidate();
        self.constant = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;
    use crate::controller::{ControllerBank, MidiController};
    use crate::producer::produce;
    use crate::round::Round;

    fn unit_param() -> FloatParam {
        let mut param = FloatParam::new(ParamDescriptor::new("Level", "Lvl", 0.0, 1.0, 0.0));
        param.configure(1000.0, 16).unwrap();
        param
    }

    #[test]
    fn smoothed_param_converges() {
        let mut param = SmoothedParam::with_config(0.0, 48000.0, 5.0);
        param.set_target(1.0);
        for _ in 0..4800 {
            param.advance();
        }
        assert!(param.is_settled());
    }

    #[test]
    fn smoothed_param_without_time_is_instant() {
        let mut param = SmoothedParam::new(0.0);
        param.set_target(0.3);
        assert_eq!(param.advance(), 0.3);
    }

    #[test]
    fn idle_param_is_constant() {
        let mut param = unit_param();
        let out = produce(&mut param, &BlockContext::new(Round(1), 16, 1000.0));
        assert!(out.channel(0).iter().all(|&s| s == 0.0));
        assert!(param.is_constant_in_round());
    }

    #[test]
    fn set_value_lands_on_its_sample() {
        let mut param = unit_param();
        let before = param.change_index();
        param.schedule_value(5, 0.5);

        let out = produce(&mut param, &BlockContext::new(Round(1), 16, 1000.0))
            .channel(0)
            .to_vec();
        assert_eq!(out[4], 0.0);
        assert_eq!(out[5], 0.5);
        assert!(!param.is_constant_in_round());
        assert_eq!(param.change_index(), before.next());
    }

    #[test]
    fn linear_ramp_reaches_target() {
        let mut param = unit_param();
        param.schedule_ramp(2, 1.0, 0.004);

        let out = produce(&mut param, &BlockContext::new(Round(1), 16, 1000.0))
            .channel(0)
            .to_vec();
        assert_eq!(&out[..7], &[0.0, 0.0, 0.0, 0.25, 0.5, 0.75, 1.0]);
        assert_eq!(param.value(), 1.0);

        produce(&mut param, &BlockContext::new(Round(2), 16, 1000.0));
        assert!(param.is_constant_in_round());
    }

    #[test]
    fn cancel_freezes_ramp() {
        let mut param = unit_param();
        param.schedule_ramp(0, 1.0, 0.008);
        param.cancel(4);

        let out = produce(&mut param, &BlockContext::new(Round(1), 16, 1000.0))
            .channel(0)
            .to_vec();
        assert!(out[4..].iter().all(|&s| s == 0.5));
    }

    #[test]
    fn values_are_clamped_to_the_range() {
        let mut param = unit_param();
        param.set_value(7.0);
        assert_eq!(param.value(), 1.0);
    }

    #[test]
    fn follows_timed_controller_changes() {
        let mut bank = ControllerBank::new();
        let id = bank.add(MidiController::new(0.0));
        bank.configure(1000.0, 16).unwrap();

        let mut param = unit_param();
        param.follow(Some(id));

        bank.render(Round(1), 16, 1000.0);
        let ctx = BlockContext::new(Round(1), 16, 1000.0).with_controllers(bank.as_slice());
        produce(&mut param, &ctx);
        assert_eq!(param.value(), 0.0);

        bank.get_mut(id).unwrap().change_at(10, 1.0);
        bank.render(Round(2), 16, 1000.0);
        let ctx = BlockContext::new(Round(2), 16, 1000.0).with_controllers(bank.as_slice());
        let out = produce(&mut param, &ctx).channel(0).to_vec();
        assert_eq!(out[9], 0.0);
        assert_eq!(out[10], 1.0);
    }

    #[test]
    fn picks_up_untimed_controller_changes_at_block_start() {
        let mut bank = ControllerBank::new();
        let id = bank.add(MidiController::new(0.25));
        bank.configure(1000.0, 16).unwrap();

        let mut param = unit_param();
        param.follow(Some(id));
        bank.render(Round(1), 16, 1000.0);
        let ctx = BlockContext::new(Round(1), 16, 1000.0).with_controllers(bank.as_slice());
        assert_eq!(produce(&mut param, &ctx).channel(0)[0], 0.25);

        let index = param.change_index();
        bank.render(Round(2), 16, 1000.0);
        let ctx = BlockContext::new(Round(2), 16, 1000.0).with_controllers(bank.as_slice());
        produce(&mut param, &ctx);
        assert_eq!(param.change_index(), index, "unchanged controller must not bump");
    }

    #[test]
    fn later_timed_change_waits_for_its_block() {
        let mut bank = ControllerBank::new();
        let id = bank.add(MidiController::new(0.0));
        bank.configure(1000.0, 16).unwrap();

        let mut param = unit_param();
        param.follow(Some(id));
        bank.render(Round(1), 16, 1000.0);
        produce(
            &mut param,
            &BlockContext::new(Round(1), 16, 1000.0).with_controllers(bank.as_slice()),
        );

        // Due in the third of three 16-frame blocks.
        bank.get_mut(id).unwrap().change_at(40, 1.0);
        let mut rendered = Vec::new();
        for round in 2..5 {
            bank.render(Round(round), 16, 1000.0);
            let ctx = BlockContext::new(Round(round), 16, 1000.0).with_controllers(bank.as_slice());
            rendered.extend_from_slice(produce(&mut param, &ctx).channel(0));
        }
        assert!(rendered[..40].iter().all(|&s| s == 0.0));
        assert!(rendered[40..].iter().all(|&s| s == 1.0));
    }

    #[test]
    fn smoothing_turns_controller_steps_into_ramps() {
        let mut bank = ControllerBank::new();
        let mut controller = MidiController::new(0.0);
        controller.set_smoothing_seconds(0.008);
        let id = bank.add(controller);
        bank.configure(1000.0, 16).unwrap();

        let mut param = unit_param();
        param.follow(Some(id));
        bank.render(Round(1), 16, 1000.0);
        produce(
            &mut param,
            &BlockContext::new(Round(1), 16, 1000.0).with_controllers(bank.as_slice()),
        );

        bank.get_mut(id).unwrap().change_at(0, 1.0);
        bank.render(Round(2), 16, 1000.0);
        let ctx = BlockContext::new(Round(2), 16, 1000.0).with_controllers(bank.as_slice());
        let out = produce(&mut param, &ctx).channel(0).to_vec();
        assert_eq!(out[0], 0.0);
        assert_eq!(out[4], 0.5);
        assert_eq!(out[8], 1.0);
    }
}
