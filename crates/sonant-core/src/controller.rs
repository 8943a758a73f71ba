//! MIDI-controller style value sources.
//!
//! A [`MidiController`] is a zero-channel producer holding a normalized value
//! in `[0, 1]` and a [`ChangeIndex`]. Its render pass emits no samples; it
//! only collects the `CHANGE` events due in the current block so consumers
//! that smooth or step at sample offsets can read them through
//! [`MidiController::block_events`]. Consumers that only need the latest
//! value read [`MidiController::value`] lazily and compare the change index
//! with their own [`ChangeTracker`](crate::ChangeTracker).
//!
//! Control threads talk to a controller through a [`ControllerHandle`]. The
//! value and change index are atomics shared by both sides, so a timed change
//! is visible immediately while its event travels through the queue.

use alloc::collections::TryReserveError;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::Ordering;

use atomic_float::AtomicF32;

use crate::buffer::SampleBuffer;
use crate::change_index::{AtomicChangeIndex, ChangeIndex};
use crate::event::{Event, EventTag};
use crate::producer::{BlockContext, ProducerCore, SignalProducer, produce};
use crate::queue::{DEFAULT_QUEUE_CAPACITY, EventSender};
use crate::round::Round;

/// Index of a controller inside a [`ControllerBank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControllerId(pub u16);

impl ControllerId {
    /// Position in the bank.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct Shared {
    value: AtomicF32,
    change_index: AtomicChangeIndex,
}

impl Shared {
    fn set(&self, value: f32) -> ChangeIndex {
        self.value.store(value, Ordering::Release);
        self.change_index.bump()
    }
}

/// A value source with change-index versioning.
#[derive(Debug)]
pub struct MidiController {
    core: ProducerCore,
    shared: Arc<Shared>,
    block_events: Vec<Event>,
    smoothing_seconds: f32,
}

impl MidiController {
    /// Value change. `number_param` holds the new normalized value.
    pub const CHANGE: EventTag = EventTag(1);

    /// Value of a controller nobody has touched yet.
    pub const DEFAULT_VALUE: f32 = 0.5;

    /// Creates a controller at `initial`, clamped to `[0, 1]`.
    pub fn new(initial: f32) -> Self {
        Self::with_queue_capacity(initial, DEFAULT_QUEUE_CAPACITY)
    }

    /// Creates a controller with an explicit event queue capacity.
    pub fn with_queue_capacity(initial: f32, queue_capacity: usize) -> Self {
        Self {
            core: ProducerCore::with_queue_capacity(0, queue_capacity),
            shared: Arc::new(Shared {
                value: AtomicF32::new(initial.clamp(0.0, 1.0)),
                change_index: AtomicChangeIndex::new(),
            }),
            block_events: Vec::with_capacity(queue_capacity),
            smoothing_seconds: 0.0,
        }
    }

    /// Sets the value at `time_offset`: enqueues a `CHANGE` event and updates
    /// the value and change index immediately.
    ///
    /// If the queue is full the event is dropped (and counted) but the value
    /// still changes.
    pub fn change_at(&mut self, time_offset: u32, value: f32) {
        let value = value.clamp(0.0, 1.0);
        self.core
            .schedule(Event::with_value(Self::CHANGE, time_offset, value));
        self.shared.set(value);
    }

    /// Sets the value without an event.
    pub fn change(&mut self, value: f32) {
        self.shared.set(value.clamp(0.0, 1.0));
    }

    /// Records a change at `time_offset` of the block already rendered, as if
    /// it had been dispatched there, and updates the value. Without room in
    /// the block list only the value changes.
    pub fn emit_at(&mut self, time_offset: u32, value: f32) {
        let value = value.clamp(0.0, 1.0);
        if self.block_events.len() < self.block_events.capacity() {
            let index = self
                .block_events
                .partition_point(|e| e.time_offset <= time_offset);
            self.block_events
                .insert(index, Event::with_value(Self::CHANGE, time_offset, value));
        }
        self.shared.set(value);
    }

    /// Drops every pending event. The value and change index are unchanged.
    pub fn clear(&mut self) {
        self.core.events_mut().clear();
        self.block_events.clear();
    }

    /// Latest value.
    #[inline]
    pub fn value(&self) -> f32 {
        self.shared.value.load(Ordering::Acquire)
    }

    /// Latest change index.
    #[inline]
    pub fn change_index(&self) -> ChangeIndex {
        self.shared.change_index.load()
    }

    /// `CHANGE` events dispatched in the last rendered block, in order.
    pub fn block_events(&self) -> &[Event] {
        &self.block_events
    }

    /// Whether timed changes are still queued for later blocks. The value
    /// already reflects them, so followers wait for their offsets instead of
    /// jumping to it.
    pub fn has_pending_changes(&self) -> bool {
        !self.core.events().is_empty()
    }

    /// Seconds a consumer should take to glide across the full `[0, 1]` range
    /// when following this controller. Zero means step changes.
    pub fn smoothing_seconds(&self) -> f32 {
        self.smoothing_seconds
    }

    /// Sets the glide time used by following consumers.
    pub fn set_smoothing_seconds(&mut self, seconds: f32) {
        self.smoothing_seconds = seconds.max(0.0);
    }

    /// Creates the control-thread handle. Construction-time only.
    pub fn handle(&mut self) -> ControllerHandle {
        ControllerHandle {
            sender: self.core.sender(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Default for MidiController {
    fn default() -> Self {
        Self::new(Self::DEFAULT_VALUE)
    }
}

impl SignalProducer for MidiController {
    fn core(&self) -> &ProducerCore {
        &self.core
    }

    fn core_mut(&mut self) -> &mut ProducerCore {
        &mut self.core
    }

    fn initialize_rendering(&mut self, _ctx: &BlockContext<'_>) {
        self.block_events.clear();
    }

    fn handle_event(&mut self, event: &Event) {
        if event.tag == Self::CHANGE && self.block_events.len() < self.block_events.capacity() {
            self.block_events.push(*event);
        }
    }

    fn render(&mut self, _ctx: &BlockContext<'_>, _first: usize, _last: usize, _out: &mut SampleBuffer) {}

    fn on_configure(&mut self) -> Result<(), TryReserveError> {
        let capacity = self.core.events().capacity();
        self.block_events
            .try_reserve_exact(capacity.saturating_sub(self.block_events.len()))
    }

    fn on_reset(&mut self) {
        self.block_events.clear();
    }
}

/// Control-thread side of a [`MidiController`].
#[derive(Debug)]
pub struct ControllerHandle {
    sender: EventSender,
    shared: Arc<Shared>,
}

impl ControllerHandle {
    /// Timed change; see [`MidiController::change_at`].
    pub fn change_at(&mut self, time_offset: u32, value: f32) {
        let value = value.clamp(0.0, 1.0);
        self.sender
            .push(Event::with_value(MidiController::CHANGE, time_offset, value));
        self.shared.set(value);
    }

    /// Untimed change; see [`MidiController::change`].
    pub fn change(&mut self, value: f32) {
        self.shared.set(value.clamp(0.0, 1.0));
    }

    /// Drops every event pushed so far. Value and change index are unchanged.
    pub fn clear(&mut self) {
        self.sender.clear();
    }

    /// Latest value.
    pub fn value(&self) -> f32 {
        self.shared.value.load(Ordering::Acquire)
    }

    /// Latest change index.
    pub fn change_index(&self) -> ChangeIndex {
        self.shared.change_index.load()
    }

    /// Events dropped because the controller's queue was full.
    pub fn overflow_count(&self) -> u64 {
        self.sender.overflow_count()
    }
}

/// The shared value sources of a graph, owned by its root.
///
/// Controllers are rendered once per round, before the graph, and then
/// exposed read-only to every producer through
/// [`BlockContext::controllers`].
#[derive(Debug, Default)]
pub struct ControllerBank {
    controllers: Vec<MidiController>,
}

impl ControllerBank {
    /// An empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a controller and returns its id.
    pub fn add(&mut self, controller: MidiController) -> ControllerId {
        let id = ControllerId(self.controllers.len() as u16);
        self.controllers.push(controller);
        id
    }

    /// Looks up a controller.
    #[inline]
    pub fn get(&self, id: ControllerId) -> Option<&MidiController> {
        self.controllers.get(id.index())
    }

    /// Looks up a controller mutably.
    #[inline]
    pub fn get_mut(&mut self, id: ControllerId) -> Option<&mut MidiController> {
        self.controllers.get_mut(id.index())
    }

    /// Number of controllers.
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    /// Whether the bank is empty.
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// All controllers, indexable by [`ControllerId::index`].
    pub fn as_slice(&self) -> &[MidiController] {
        &self.controllers
    }

    /// Configures every controller.
    pub fn configure(&mut self, sample_rate: f32, block_size: usize) -> Result<(), TryReserveError> {
        self.controllers
            .iter_mut()
            .try_for_each(|controller| controller.configure(sample_rate, block_size))
    }

    /// Renders every controller for `round`.
    pub fn render(&mut self, round: Round, sample_count: usize, sample_rate: f32) {
        let ctx = BlockContext::new(round, sample_count, sample_rate);
        for controller in &mut self.controllers {
            produce(controller, &ctx);
        }
    }

    /// Drops pending events of every controller; values are kept.
    pub fn clear_events(&mut self) {
        for controller in &mut self.controllers {
            controller.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_bumps_index_exactly_once() {
        let mut controller = MidiController::new(0.0);
        let before = controller.change_index();
        controller.change(0.5);
        assert_eq!(controller.change_index(), before.next());
        assert_eq!(controller.value(), 0.5);
    }

    #[test]
    fn change_at_updates_value_before_rendering() {
        let mut controller = MidiController::new(0.0);
        controller.change_at(64, 1.0);
        assert_eq!(controller.value(), 1.0);
        assert_eq!(controller.core().events().len(), 1);
    }

    #[test]
    fn values_are_clamped() {
        let mut controller = MidiController::new(3.0);
        assert_eq!(controller.value(), 1.0);
        controller.change(-2.0);
        assert_eq!(controller.value(), 0.0);
    }

    #[test]
    fn render_collects_due_change_events() {
        let mut controller = MidiController::new(0.0);
        controller.configure(48000.0, 128).unwrap();
        controller.change_at(10, 0.25);
        controller.change_at(200, 0.75);

        produce(&mut controller, &BlockContext::new(Round(1), 128, 48000.0));
        let events = controller.block_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].time_offset, 10);
        assert_eq!(events[0].number_param, 0.25);

        produce(&mut controller, &BlockContext::new(Round(2), 128, 48000.0));
        assert_eq!(controller.block_events()[0].time_offset, 72);
    }

    #[test]
    fn clear_keeps_value_and_index() {
        let mut controller = MidiController::new(0.0);
        for t in 0..4 {
            controller.change_at(t, 0.1 * t as f32);
        }
        let value = controller.value();
        let index = controller.change_index();

        controller.clear();
        assert_eq!(controller.core_mut().events_mut().drain(128).count(), 0);
        assert_eq!(controller.value(), value);
        assert_eq!(controller.change_index(), index);
    }

    #[test]
    fn handle_changes_are_seen_by_the_audio_side() {
        let mut controller = MidiController::new(0.0);
        controller.configure(48000.0, 64).unwrap();
        let mut handle = controller.handle();

        handle.change_at(5, 0.8);
        assert_eq!(controller.value(), 0.8);
        assert_eq!(handle.change_index(), controller.change_index());

        produce(&mut controller, &BlockContext::new(Round(1), 64, 48000.0));
        assert_eq!(controller.block_events().len(), 1);
    }

    #[test]
    fn bank_renders_each_controller_once_per_round() {
        let mut bank = ControllerBank::new();
        let a = bank.add(MidiController::new(0.0));
        let b = bank.add(MidiController::new(1.0));
        bank.configure(48000.0, 32).unwrap();

        bank.render(Round(1), 32, 48000.0);
        bank.render(Round(1), 32, 48000.0);
        assert_eq!(bank.get(a).unwrap().core().render_count(), 1);
        assert_eq!(bank.get(b).unwrap().value(), 1.0);
    }
}
