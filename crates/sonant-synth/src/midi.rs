//! Decoded MIDI messages and their transport through event queues.
//!
//! Byte-level MIDI parsing belongs to the host wrapper. The engine receives
//! already decoded [`MidiEvent`]s, which travel from the control thread to
//! the audio thread packed into plain [`Event`]s so they can share the
//! lock-free queue machinery of every other producer.

use sonant_core::{Event, EventTag};

/// Sustain pedal.
pub const CC_SUSTAIN: u8 = 64;

/// MPE brightness (timbre) controller.
pub const CC_BRIGHTNESS: u8 = 74;

/// Channel mode: all sound off.
pub const CC_ALL_SOUND_OFF: u8 = 120;

/// Channel mode: all notes off.
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// Centre of the 14-bit pitch wheel.
pub const PITCH_BEND_CENTER: u16 = 8192;

/// Per-note expression dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExpressionKind {
    /// Pitch offset in semitones.
    Tuning,
    /// Gain multiplier, `[0, 4]`.
    Volume,
    /// Stereo position, `[-1, 1]`.
    Pan,
    /// Pressure, `[0, 1]`.
    Pressure,
    /// Brightness, `[0, 1]`.
    Brightness,
}

impl ExpressionKind {
    /// Every kind, in wire order.
    pub const ALL: [ExpressionKind; 5] = [
        ExpressionKind::Tuning,
        ExpressionKind::Volume,
        ExpressionKind::Pan,
        ExpressionKind::Pressure,
        ExpressionKind::Brightness,
    ];

    /// Clamps `value` into the kind's range.
    pub fn clamp(self, value: f32) -> f32 {
        match self {
            ExpressionKind::Tuning => value.clamp(-48.0, 48.0),
            ExpressionKind::Volume => value.clamp(0.0, 4.0),
            ExpressionKind::Pan => value.clamp(-1.0, 1.0),
            ExpressionKind::Pressure | ExpressionKind::Brightness => value.clamp(0.0, 1.0),
        }
    }

    /// Value before any expression arrives.
    pub const fn neutral(self) -> f32 {
        match self {
            ExpressionKind::Tuning | ExpressionKind::Pan | ExpressionKind::Pressure => 0.0,
            ExpressionKind::Volume => 1.0,
            ExpressionKind::Brightness => 0.5,
        }
    }

    fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }
}

/// A decoded MIDI channel message. Channels are `0..16`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MidiEvent {
    /// Key pressed. Velocity 0 is treated as a note-off.
    NoteOn {
        /// Channel.
        channel: u8,
        /// Note number.
        note: u8,
        /// 7-bit velocity.
        velocity: u8,
    },
    /// Key released.
    NoteOff {
        /// Channel.
        channel: u8,
        /// Note number.
        note: u8,
    },
    /// Control change.
    ControlChange {
        /// Channel.
        channel: u8,
        /// Controller number.
        controller: u8,
        /// 7-bit value.
        value: u8,
    },
    /// Pitch wheel, 14-bit, centre [`PITCH_BEND_CENTER`].
    PitchBend {
        /// Channel.
        channel: u8,
        /// 14-bit value.
        value: u16,
    },
    /// Channel aftertouch.
    ChannelPressure {
        /// Channel.
        channel: u8,
        /// 7-bit pressure.
        pressure: u8,
    },
    /// Per-note expression, in plain units.
    NoteExpression {
        /// Channel.
        channel: u8,
        /// Note number.
        note: u8,
        /// Dimension.
        kind: ExpressionKind,
        /// Value, clamped to the kind's range on arrival.
        value: f32,
    },
}

const NOTE_ON: EventTag = EventTag(1);
const NOTE_OFF: EventTag = EventTag(2);
const CONTROL_CHANGE: EventTag = EventTag(3);
const PITCH_BEND: EventTag = EventTag(4);
const CHANNEL_PRESSURE: EventTag = EventTag(5);
const NOTE_EXPRESSION: EventTag = EventTag(6);

impl MidiEvent {
    /// Channel the message arrived on.
    pub fn channel(&self) -> u8 {
        match *self {
            MidiEvent::NoteOn { channel, .. }
            | MidiEvent::NoteOff { channel, .. }
            | MidiEvent::ControlChange { channel, .. }
            | MidiEvent::PitchBend { channel, .. }
            | MidiEvent::ChannelPressure { channel, .. }
            | MidiEvent::NoteExpression { channel, .. } => channel,
        }
    }

    /// A note-on with zero velocity becomes a note-off.
    pub fn normalized(self) -> Self {
        match self {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity: 0,
            } => MidiEvent::NoteOff { channel, note },
            other => other,
        }
    }

    /// Packs the message into a queue event at `time_offset`.
    pub fn to_event(self, time_offset: u32) -> Event {
        let pack = |channel: u8, data: u8| i32::from(channel & 0x0f) | (i32::from(data & 0x7f) << 8);
        match self {
            MidiEvent::NoteOn {
                channel,
                note,
                velocity,
            } => Event::with_value(NOTE_ON, time_offset, f32::from(velocity.min(127))).int(pack(channel, note)),
            MidiEvent::NoteOff { channel, note } => Event::new(NOTE_OFF, time_offset).int(pack(channel, note)),
            MidiEvent::ControlChange {
                channel,
                controller,
                value,
            } => Event::with_value(CONTROL_CHANGE, time_offset, f32::from(value.min(127)))
                .int(pack(channel, controller)),
            MidiEvent::PitchBend { channel, value } => {
                Event::with_value(PITCH_BEND, time_offset, f32::from(value.min(16383))).int(pack(channel, 0))
            }
            MidiEvent::ChannelPressure { channel, pressure } => {
                Event::with_value(CHANNEL_PRESSURE, time_offset, f32::from(pressure.min(127))).int(pack(channel, 0))
            }
            MidiEvent::NoteExpression {
                channel,
                note,
                kind,
                value,
            } => Event::with_value(NOTE_EXPRESSION, time_offset, kind.clamp(value))
                .int(pack(channel, note))
                .aux(kind as u8 as f32),
        }
    }

    /// Unpacks an event produced by [`to_event`](Self::to_event).
    pub fn from_event(event: &Event) -> Option<Self> {
        let channel = (event.int_param & 0x0f) as u8;
        let data = ((event.int_param >> 8) & 0x7f) as u8;
        let seven_bit = event.number_param as u8;
        let message = match event.tag {
            NOTE_ON => MidiEvent::NoteOn {
                channel,
                note: data,
                velocity: seven_bit,
            },
            NOTE_OFF => MidiEvent::NoteOff { channel, note: data },
            CONTROL_CHANGE => MidiEvent::ControlChange {
                channel,
                controller: data,
                value: seven_bit,
            },
            PITCH_BEND => MidiEvent::PitchBend {
                channel,
                value: event.number_param as u16,
            },
            CHANNEL_PRESSURE => MidiEvent::ChannelPressure {
                channel,
                pressure: seven_bit,
            },
            NOTE_EXPRESSION => MidiEvent::NoteExpression {
                channel,
                note: data,
                kind: ExpressionKind::from_index(event.aux as usize)?,
                value: event.number_param,
            },
            _ => return None,
        };
        Some(message)
    }
}

/// 7-bit value → `[0, 1]`.
#[inline]
pub fn normalize_7bit(value: u8) -> f32 {
    f32::from(value.min(127)) / 127.0
}

/// 14-bit pitch wheel → `[0, 1]` with the centre exactly at 0.5.
#[inline]
pub fn normalize_pitch_bend(value: u16) -> f32 {
    let value = value.min(16383);
    if value >= PITCH_BEND_CENTER {
        0.5 + f32::from(value - PITCH_BEND_CENTER) / (2.0 * 8191.0)
    } else {
        f32::from(value) / (2.0 * f32::from(PITCH_BEND_CENTER))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_survive_the_queue_encoding() {
        let messages = [
            MidiEvent::NoteOn {
                channel: 3,
                note: 60,
                velocity: 100,
            },
            MidiEvent::NoteOff { channel: 15, note: 127 },
            MidiEvent::ControlChange {
                channel: 0,
                controller: 74,
                value: 127,
            },
            MidiEvent::PitchBend {
                channel: 2,
                value: 16383,
            },
            MidiEvent::ChannelPressure {
                channel: 9,
                pressure: 64,
            },
            MidiEvent::NoteExpression {
                channel: 1,
                note: 64,
                kind: ExpressionKind::Pan,
                value: -0.25,
            },
        ];
        for message in messages {
            let event = message.to_event(17);
            assert_eq!(event.time_offset, 17);
            assert_eq!(MidiEvent::from_event(&event), Some(message));
        }
    }

    #[test]
    fn zero_velocity_note_on_is_a_note_off() {
        let on = MidiEvent::NoteOn {
            channel: 0,
            note: 60,
            velocity: 0,
        };
        assert_eq!(on.normalized(), MidiEvent::NoteOff { channel: 0, note: 60 });
    }

    #[test]
    fn expression_values_are_clamped_on_encoding() {
        let event = MidiEvent::NoteExpression {
            channel: 0,
            note: 60,
            kind: ExpressionKind::Pressure,
            value: 3.0,
        }
        .to_event(0);
        assert_eq!(event.number_param, 1.0);
    }

    #[test]
    fn pitch_bend_normalization_hits_the_ends_and_centre() {
        assert_eq!(normalize_pitch_bend(0), 0.0);
        assert_eq!(normalize_pitch_bend(PITCH_BEND_CENTER), 0.5);
        assert_eq!(normalize_pitch_bend(16383), 1.0);
    }

    #[test]
    fn unknown_tags_are_rejected() {
        assert_eq!(MidiEvent::from_event(&Event::new(EventTag(200), 0)), None);
    }
}
