//! Controller layout and parameter routing.
//!
//! Every value a parameter can follow lives in one [`ControllerBank`] owned
//! by the synth, laid out as:
//!
//! | Ids                          | Controllers                          |
//! |------------------------------|--------------------------------------|
//! | `0..PARAM_COUNT`             | host parameters, one per [`Param`]   |
//! | next 128                     | MIDI CC 0..=127                      |
//! | next 1                       | pitch wheel                          |
//! | next 1                       | channel pressure                     |
//! | next 1                       | last triggered note                  |
//! | next 1                       | last triggered velocity              |
//! | next `MACRO_COUNT`           | macro outputs                        |
//!
//! A parameter follows its own host controller until it is reassigned.

use sonant_core::{ControllerBank, ControllerHandle, ControllerId, MidiController, ParamFlags};

use crate::config::EngineConfig;
use crate::params::{MACRO_COUNT, PARAM_COUNT, Param};

/// Seconds a follower takes to glide across the full range of a MIDI source.
pub const MIDI_SMOOTHING_SECONDS: f32 = 0.2;

const CC_COUNT: u16 = 128;
const CC_BASE: u16 = PARAM_COUNT as u16;
const PITCH_WHEEL: u16 = CC_BASE + CC_COUNT;
const CHANNEL_PRESSURE: u16 = PITCH_WHEEL + 1;
const NOTE: u16 = CHANNEL_PRESSURE + 1;
const VELOCITY: u16 = NOTE + 1;
const MACRO_BASE: u16 = VELOCITY + 1;

/// Number of controllers in the synth's bank.
pub const CONTROLLER_COUNT: usize = MACRO_BASE as usize + MACRO_COUNT;

/// A value a parameter can be assigned to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControllerSource {
    /// A host parameter's own controller.
    Param(Param),
    /// A MIDI continuous controller, `0..=127`.
    Cc(u8),
    /// The channel-wide pitch wheel.
    PitchWheel,
    /// Channel-wide aftertouch.
    ChannelPressure,
    /// Note number of the last note-on, `0..=127` scaled to `[0, 1]`.
    Note,
    /// Velocity of the last note-on.
    Velocity,
    /// Output of a macro, `0..MACRO_COUNT`.
    Macro(u8),
}

impl ControllerSource {
    /// Position in the synth's controller bank, or `None` for an
    /// out-of-range CC or macro number.
    pub fn controller_id(self) -> Option<ControllerId> {
        let id = match self {
            ControllerSource::Param(param) => param.index() as u16,
            ControllerSource::Cc(cc) if u16::from(cc) < CC_COUNT => CC_BASE + u16::from(cc),
            ControllerSource::PitchWheel => PITCH_WHEEL,
            ControllerSource::ChannelPressure => CHANNEL_PRESSURE,
            ControllerSource::Note => NOTE,
            ControllerSource::Velocity => VELOCITY,
            ControllerSource::Macro(slot) if usize::from(slot) < MACRO_COUNT => MACRO_BASE + u16::from(slot),
            _ => return None,
        };
        Some(ControllerId(id))
    }

    /// Whether this source is driven by MIDI rather than the host.
    pub fn is_midi(self) -> bool {
        matches!(
            self,
            ControllerSource::Cc(_)
                | ControllerSource::PitchWheel
                | ControllerSource::ChannelPressure
                | ControllerSource::Note
                | ControllerSource::Velocity
        )
    }
}

/// Whether `param` may follow something other than its own controller.
pub fn is_assignable(param: Param) -> bool {
    param.descriptor().flags.contains(ParamFlags::ASSIGNABLE)
}

/// Control-thread request applied at the next block start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Command {
    /// Reroute `param`; `None` restores its own host controller.
    Assign {
        param: Param,
        source: Option<ControllerSource>,
    },
}

/// Builds the controller bank and the host-side handles of the parameter
/// controllers, seeded with the configured initial values.
pub(crate) fn build_bank(config: &EngineConfig) -> (ControllerBank, Vec<ControllerHandle>) {
    let capacity = config.event_queue_capacity;
    let mut initial: [f32; PARAM_COUNT] = Param::ALL.map(|param| param.descriptor().default_normalized());
    for (param, normalized) in config.initial_values() {
        initial[param.index()] = normalized;
    }

    let mut bank = ControllerBank::new();
    let mut handles = Vec::with_capacity(PARAM_COUNT);
    for value in initial {
        let id = bank.add(MidiController::with_queue_capacity(value, capacity));
        if let Some(controller) = bank.get_mut(id) {
            handles.push(controller.handle());
        }
    }

    let midi = |initial: f32| {
        let mut controller = MidiController::with_queue_capacity(initial, capacity);
        controller.set_smoothing_seconds(MIDI_SMOOTHING_SECONDS);
        controller
    };
    for _ in 0..CC_COUNT {
        bank.add(midi(0.0));
    }
    bank.add(midi(0.5));
    bank.add(midi(0.0));
    // Note and velocity step at the note-on.
    bank.add(MidiController::with_queue_capacity(0.0, capacity));
    bank.add(MidiController::with_queue_capacity(0.0, capacity));
    for _ in 0..MACRO_COUNT {
        bank.add(midi(MidiController::DEFAULT_VALUE));
    }

    (bank, handles)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_dense() {
        let (bank, handles) = build_bank(&EngineConfig::default());
        assert_eq!(bank.len(), CONTROLLER_COUNT);
        assert_eq!(handles.len(), PARAM_COUNT);

        let last_macro = ControllerSource::Macro(MACRO_COUNT as u8 - 1).controller_id().unwrap();
        assert_eq!(last_macro.index(), CONTROLLER_COUNT - 1);
        assert_eq!(
            ControllerSource::Cc(0).controller_id(),
            Some(ControllerId(PARAM_COUNT as u16))
        );
    }

    #[test]
    fn test_out_of_range_sources() {
        assert_eq!(ControllerSource::Cc(128).controller_id(), None);
        assert_eq!(ControllerSource::Macro(MACRO_COUNT as u8).controller_id(), None);
    }

    #[test]
    fn test_initial_values_seed_the_param_controllers() {
        let mut config = EngineConfig::default();
        config.params.insert("volume".into(), 0.25);
        let (bank, handles) = build_bank(&config);

        let id = ControllerSource::Param(Param::Volume).controller_id().unwrap();
        assert!((bank.get(id).unwrap().value() - 0.25).abs() < 1e-6);
        assert!((handles[Param::Volume.index()].value() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_midi_sources_are_smoothed() {
        let (bank, _) = build_bank(&EngineConfig::default());
        let cc = ControllerSource::Cc(1).controller_id().unwrap();
        let host = ControllerSource::Param(Param::Volume).controller_id().unwrap();
        assert_eq!(bank.get(cc).unwrap().smoothing_seconds(), MIDI_SMOOTHING_SECONDS);
        assert_eq!(bank.get(host).unwrap().smoothing_seconds(), 0.0);
        assert!(ControllerSource::PitchWheel.is_midi());
        assert!(!ControllerSource::Macro(0).is_midi());
    }

    #[test]
    fn test_macro_inputs_are_not_assignable() {
        assert!(is_assignable(Param::FilterCutoff));
        assert!(!is_assignable(Param::Macro1Input));
    }

    #[test]
    fn test_note_sources_sit_between_pressure_and_macros() {
        let (bank, _) = build_bank(&EngineConfig::default());
        let pressure = ControllerSource::ChannelPressure.controller_id().unwrap().index();
        let note = ControllerSource::Note.controller_id().unwrap();
        let velocity = ControllerSource::Velocity.controller_id().unwrap();
        assert_eq!(note.index(), pressure + 1);
        assert_eq!(velocity.index(), pressure + 2);
        assert_eq!(
            ControllerSource::Macro(0).controller_id().unwrap().index(),
            pressure + 3
        );
        assert_eq!(bank.get(note).unwrap().smoothing_seconds(), 0.0);
        assert!(ControllerSource::Velocity.is_midi());
    }
}
