//! Timestamped control events dispatched to producers.

/// Producer-specific event type.
///
/// The producer base treats tags as opaque dispatch points. Tag `0` is
/// reserved for [`EventTag::CANCEL`] and tag `255` for the queue-internal
/// clear marker; everything in between is free for producers to define.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventTag(pub u8);

impl EventTag {
    /// Cancel whatever the producer is doing. Shared by every producer kind.
    pub const CANCEL: Self = Self(0);

    /// Marker used by [`crate::queue::EventSender::clear`]; never dispatched.
    pub(crate) const CLEAR_QUEUE: Self = Self(255);
}

/// A control message scheduled into a producer's queue.
///
/// `time_offset` is relative to the start of the block in which the event
/// is dispatched. Events that land beyond the current block stay queued and
/// have their offset reduced at every block boundary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Event {
    /// Dispatch tag.
    pub tag: EventTag,
    /// Offset in samples from the start of the block.
    pub time_offset: u32,
    /// Integer payload (note number, expression kind, ...).
    pub int_param: i32,
    /// Numeric payload (value, velocity, ramp target, ...).
    pub number_param: f32,
    /// Secondary numeric payload (ramp duration, channel, ...).
    pub aux: f32,
}

impl Event {
    /// Creates an event with empty payloads.
    #[inline]
    pub const fn new(tag: EventTag, time_offset: u32) -> Self {
        Self {
            tag,
            time_offset,
            int_param: 0,
            number_param: 0.0,
            aux: 0.0,
        }
    }

    /// Creates an event carrying a single value.
    #[inline]
    pub const fn with_value(tag: EventTag, time_offset: u32, number_param: f32) -> Self {
        Self {
            tag,
            time_offset,
            int_param: 0,
            number_param,
            aux: 0.0,
        }
    }

    /// Sets the integer payload.
    #[inline]
    pub const fn int(mut self, int_param: i32) -> Self {
        self.int_param = int_param;
        self
    }

    /// Sets the auxiliary payload.
    #[inline]
    pub const fn aux(mut self, aux: f32) -> Self {
        self.aux = aux;
        self
    }

    /// Time offset as an index into a block.
    #[inline]
    pub fn offset(&self) -> usize {
        self.time_offset as usize
    }
}
