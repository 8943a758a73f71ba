//! Macros: derived controllers.
//!
//! A [`Macro`] reads a handful of controllers from a [`ControllerBank`]
//! (input, range, amount, midpoint, distortion, randomness) and writes the
//! shaped result into its own output controller. Anything that can follow a
//! controller can follow a macro output.
//!
//! [`Macro::update`] runs after the bank has rendered a block. Timed input
//! changes dispatched in that block are replayed in order and land on the
//! output at their own offsets; untimed changes land at the block start.
//! An idle macro never bumps its output's change index and never wakes up
//! downstream consumers.

use crate::change_index::ChangeTracker;
use crate::controller::{ControllerBank, ControllerId};

/// The inputs of a [`Macro`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MacroInput {
    /// The value being shaped.
    Input,
    /// Output at input 0.
    Min,
    /// Output at input 1 with full amount.
    Max,
    /// Scales the span between `Min` and `Max`.
    Amount,
    /// Where input 0.5 lands before distortion.
    Midpoint,
    /// Blend towards an S-curve.
    Distortion,
    /// Blend towards a deterministic pseudo-random value.
    Randomness,
}

impl MacroInput {
    /// Every input, in storage order.
    pub const ALL: [MacroInput; 7] = [
        MacroInput::Input,
        MacroInput::Min,
        MacroInput::Max,
        MacroInput::Amount,
        MacroInput::Midpoint,
        MacroInput::Distortion,
        MacroInput::Randomness,
    ];

    /// Value of an unconnected input.
    pub const fn default_value(self) -> f32 {
        match self {
            MacroInput::Input | MacroInput::Midpoint => 0.5,
            MacroInput::Min | MacroInput::Distortion | MacroInput::Randomness => 0.0,
            MacroInput::Max | MacroInput::Amount => 1.0,
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

const INPUTS: usize = MacroInput::ALL.len();

/// Steepness of the distortion S-curve.
const DISTORTION_STEEPNESS: f32 = 8.0;

/// A controller computed from other controllers.
#[derive(Debug, Clone)]
pub struct Macro {
    inputs: [Option<ControllerId>; INPUTS],
    trackers: [ChangeTracker; INPUTS],
    current: [f32; INPUTS],
    output: ControllerId,
    connections_changed: bool,
}

impl Macro {
    /// A macro writing to `output` with every input unconnected.
    pub fn new(output: ControllerId) -> Self {
        Self {
            inputs: [None; INPUTS],
            trackers: [ChangeTracker::new(); INPUTS],
            current: MacroInput::ALL.map(MacroInput::default_value),
            output,
            connections_changed: true,
        }
    }

    /// Connects (or disconnects) one input.
    pub fn connect(&mut self, input: MacroInput, controller: Option<ControllerId>) {
        self.inputs[input.index()] = controller;
        self.trackers[input.index()].invalidate();
        self.connections_changed = true;
    }

    /// Builder form of [`connect`](Self::connect).
    pub fn with_input(mut self, input: MacroInput, controller: ControllerId) -> Self {
        self.connect(input, Some(controller));
        self
    }

    /// Controller feeding `input`.
    pub fn input(&self, input: MacroInput) -> Option<ControllerId> {
        self.inputs[input.index()]
    }

    /// Controller receiving the result.
    pub fn output(&self) -> ControllerId {
        self.output
    }

    /// Recomputes the output if any input changed during the block just
    /// rendered. Returns `true` if the output controller was written.
    pub fn update(&mut self, bank: &mut ControllerBank) -> bool {
        let mut at_start = core::mem::take(&mut self.connections_changed);
        let mut timed = false;

        for slot in 0..INPUTS {
            let Some(controller) = self.inputs[slot].and_then(|id| bank.get(id)) else {
                self.current[slot] = MacroInput::ALL[slot].default_value();
                continue;
            };
            let changed = self.trackers[slot].refresh(controller.change_index());
            if !controller.block_events().is_empty() {
                timed = true;
            } else if changed && !controller.has_pending_changes() {
                self.current[slot] = controller.value();
                at_start = true;
            }
        }

        let mut written = at_start && self.emit(bank, 0);
        if !timed {
            return written;
        }

        let mut cursors = [0usize; INPUTS];
        loop {
            let next = (0..INPUTS)
                .filter_map(|slot| {
                    let controller = self.inputs[slot].and_then(|id| bank.get(id))?;
                    controller.block_events().get(cursors[slot]).map(|e| e.time_offset)
                })
                .min();
            let Some(time_offset) = next else {
                break;
            };

            for (slot, cursor) in cursors.iter_mut().enumerate() {
                let Some(controller) = self.inputs[slot].and_then(|id| bank.get(id)) else {
                    continue;
                };
                let events = controller.block_events();
                let before = *cursor;
                while let Some(event) = events.get(*cursor).filter(|e| e.time_offset == time_offset) {
                    self.current[slot] = event.number_param;
                    *cursor += 1;
                }
                // An untimed change after the last timed one still wins.
                if *cursor > before && *cursor == events.len() && !controller.has_pending_changes() {
                    self.current[slot] = controller.value();
                }
            }
            written |= self.emit(bank, time_offset);
        }
        written
    }

    fn emit(&self, bank: &mut ControllerBank, time_offset: u32) -> bool {
        let value = Self::compute(&self.current);
        match bank.get_mut(self.output) {
            Some(output) if output.value() != value => {
                output.emit_at(time_offset, value);
                true
            }
            _ => false,
        }
    }

    /// The transfer function, inputs indexed like [`MacroInput::ALL`].
    pub fn compute(values: &[f32; INPUTS]) -> f32 {
        let get = |input: MacroInput| values[input.index()].clamp(0.0, 1.0);

        let input = get(MacroInput::Input);
        let midpoint = get(MacroInput::Midpoint);
        let shifted = if input < 0.5 {
            2.0 * input * midpoint
        } else {
            midpoint + (2.0 * input - 1.0) * (1.0 - midpoint)
        };

        let shaped = randomize(get(MacroInput::Randomness), distort(get(MacroInput::Distortion), shifted));
        let min = get(MacroInput::Min);
        (min + shaped * get(MacroInput::Amount) * (get(MacroInput::Max) - min)).clamp(0.0, 1.0)
    }
}

/// Blends `x` with a tanh S-curve through `(0.5, 0.5)`.
fn distort(amount: f32, x: f32) -> f32 {
    if amount <= 0.0 {
        return x;
    }
    let half = libm::tanhf(DISTORTION_STEEPNESS * 0.5);
    let curved = 0.5 + 0.5 * libm::tanhf(DISTORTION_STEEPNESS * (x - 0.5)) / half;
    x + amount * (curved - x)
}

/// Blends `x` with a value hashed from `x` itself, so equal inputs always
/// give equal outputs.
fn randomize(amount: f32, x: f32) -> f32 {
    if amount <= 0.0 {
        return x;
    }
    let hashed = libm::sinf(x * 12.9898 + 78.233) * 43758.547;
    let noise = hashed - libm::floorf(hashed);
    x + amount * (noise - x)
}
