//! Control-thread side of a [`Synth`](crate::Synth).

use ringbuf::HeapProd;
use ringbuf::traits::Producer;
use sonant_core::{ChangeIndex, ControllerHandle, EventSender};

use crate::midi::MidiEvent;
use crate::params::Param;
use crate::routing::{Command, ControllerSource, is_assignable};

/// Everything a host wrapper, GUI or MIDI thread needs to talk to a running
/// synth. Created together with the synth; `Send`, not `Sync`.
///
/// Every method is lock-free and allocation-free. Messages are queued and
/// take effect in the next rendered block; parameter values and change
/// indexes are visible immediately.
pub struct SynthHandle {
    params: Vec<ControllerHandle>,
    midi: EventSender,
    commands: HeapProd<Command>,
}

impl core::fmt::Debug for SynthHandle {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SynthHandle")
            .field("params", &self.params.len())
            .field("midi", &self.midi)
            .finish_non_exhaustive()
    }
}

impl SynthHandle {
    pub(crate) fn new(params: Vec<ControllerHandle>, midi: EventSender, commands: HeapProd<Command>) -> Self {
        Self { params, midi, commands }
    }

    fn param_handle(&mut self, id: u32) -> Option<&mut ControllerHandle> {
        let param = Param::from_id(id)?;
        self.params.get_mut(param.index())
    }

    /// Sets parameter `id` to `normalized` at `time_offset` samples into the
    /// next block. Out-of-range values are clamped; unknown ids and
    /// non-finite values are ignored and return `false`.
    pub fn set_parameter(&mut self, id: u32, normalized: f32, time_offset: u32) -> bool {
        if !normalized.is_finite() {
            tracing::warn!(id, normalized, "ignoring non-finite parameter value");
            return false;
        }
        let Some(handle) = self.param_handle(id) else {
            tracing::warn!(id, "ignoring unknown parameter id");
            return false;
        };
        handle.change_at(time_offset, normalized);
        true
    }

    /// Sets parameter `id` without a timed event. The audio side picks the
    /// value up at the start of the next block.
    pub fn set_parameter_untimed(&mut self, id: u32, normalized: f32) -> bool {
        if !normalized.is_finite() {
            tracing::warn!(id, normalized, "ignoring non-finite parameter value");
            return false;
        }
        match self.param_handle(id) {
            Some(handle) => {
                handle.change(normalized);
                true
            }
            None => {
                tracing::warn!(id, "ignoring unknown parameter id");
                false
            }
        }
    }

    /// Drops every timed change of parameter `id` not yet rendered. The
    /// value and change index stay where they are.
    pub fn clear_parameter(&mut self, id: u32) -> bool {
        match self.param_handle(id) {
            Some(handle) => {
                handle.clear();
                true
            }
            None => false,
        }
    }

    /// Latest normalized value of parameter `id`.
    pub fn parameter(&self, id: u32) -> Option<f32> {
        let param = Param::from_id(id)?;
        self.params.get(param.index()).map(ControllerHandle::value)
    }

    /// Latest change index of parameter `id`.
    pub fn parameter_change_index(&self, id: u32) -> Option<ChangeIndex> {
        let param = Param::from_id(id)?;
        self.params.get(param.index()).map(ControllerHandle::change_index)
    }

    /// Queues a MIDI message at `time_offset`. Returns `false` if the MIDI
    /// queue is full.
    pub fn deliver_midi(&mut self, event: MidiEvent, time_offset: u32) -> bool {
        self.midi.push(event.normalized().to_event(time_offset))
    }

    /// Reroutes `param` to follow `source`, or back to its own host
    /// controller with `None`. Applied at the next block start.
    pub fn assign_controller(&mut self, param: Param, source: Option<ControllerSource>) -> bool {
        if !is_assignable(param) {
            tracing::warn!(param = param.descriptor().string_id, "parameter is not assignable");
            return false;
        }
        if source.is_some_and(|s| s.controller_id().is_none()) {
            tracing::warn!(param = param.descriptor().string_id, ?source, "controller source out of range");
            return false;
        }
        if self.commands.try_push(Command::Assign { param, source }).is_err() {
            tracing::warn!(param = param.descriptor().string_id, "command queue full, assignment dropped");
            return false;
        }
        tracing::debug!(param = param.descriptor().string_id, ?source, "controller assignment queued");
        true
    }

    /// MIDI messages dropped because the MIDI queue was full.
    pub fn midi_overflow_count(&self) -> u64 {
        self.midi.overflow_count()
    }

    /// Parameter changes dropped because a parameter queue was full.
    pub fn parameter_overflow_count(&self) -> u64 {
        self.params.iter().map(ControllerHandle::overflow_count).sum()
    }

    /// Every dropped message, MIDI and parameter changes together.
    pub fn overflow_count(&self) -> u64 {
        self.midi_overflow_count() + self.parameter_overflow_count()
    }

    /// Logs the overflow totals if anything was dropped.
    pub fn log_overflow(&self) {
        let midi = self.midi_overflow_count();
        let params = self.parameter_overflow_count();
        if midi + params > 0 {
            tracing::warn!(midi, params, "events dropped on full queues");
        } else {
            tracing::debug!("no events dropped");
        }
    }
}
