//! The signal-producer contract and memoized, event-segmented rendering.
//!
//! A producer is a node of the audio graph. It owns an output
//! [`SampleBuffer`], an [`EventQueue`] and whatever children it pulls from.
//! Rendering is driven by the free function [`produce`]:
//!
//! 1. If the producer already rendered the requested [`Round`], the cached
//!    buffer is returned untouched.
//! 2. Control-thread events are pulled into the producer's queue and
//!    [`SignalProducer::initialize_rendering`] runs. Composite producers
//!    render their children here.
//! 3. The block is split at event offsets. For each offset `t` every event
//!    due at `t` goes through [`SignalProducer::handle_event`] (ties in
//!    insertion order), then [`SignalProducer::render`] emits samples up to
//!    the next event.
//! 4. [`SignalProducer::finalize_rendering`] runs, leftover events shift into
//!    the next block and the round is recorded.
//!
//! Nothing in this path allocates. The output buffer is moved out of the
//! producer while rendering so implementations can borrow their children and
//! write their own output at the same time.
//!
//! # Example
//!
//! ```rust
//! use sonant_core::{BlockContext, ProducerCore, Round, SampleBuffer, SignalProducer, produce};
//!
//! struct Dc {
//!     core: ProducerCore,
//!     level: f32,
//! }
//!
//! impl SignalProducer for Dc {
//!     fn core(&self) -> &ProducerCore { &self.core }
//!     fn core_mut(&mut self) -> &mut ProducerCore { &mut self.core }
//!
//!     fn render(&mut self, _ctx: &BlockContext<'_>, first: usize, last: usize, out: &mut SampleBuffer) {
//!         out.channel_mut(0)[first..last].fill(self.level);
//!     }
//! }
//!
//! let mut dc = Dc { core: ProducerCore::new(1), level: 0.5 };
//! dc.configure(48000.0, 64).unwrap();
//!
//! let ctx = BlockContext::new(Round(1), 64, 48000.0);
//! assert_eq!(produce(&mut dc, &ctx).channel(0)[63], 0.5);
//! ```

use alloc::collections::TryReserveError;
use core::mem;

use crate::buffer::SampleBuffer;
use crate::controller::{ControllerId, MidiController};
use crate::event::Event;
use crate::queue::{DEFAULT_QUEUE_CAPACITY, EventQueue, EventSender};
use crate::round::Round;
use crate::tempo::TransportInfo;

/// Default sample rate before a session is configured.
pub const DEFAULT_SAMPLE_RATE: f32 = 44100.0;

/// Default block size before a session is configured.
pub const DEFAULT_BLOCK_SIZE: usize = 128;

/// Read-only state shared by every producer for one block.
#[derive(Debug, Clone, Copy)]
pub struct BlockContext<'a> {
    /// Memoization key of this block.
    pub round: Round,
    /// Samples to render, at most the configured block size.
    pub sample_count: usize,
    /// Session sample rate.
    pub sample_rate: f32,
    /// Host transport for tempo-dependent producers.
    pub transport: TransportInfo,
    /// Shared value sources, already rendered for this round.
    pub controllers: &'a [MidiController],
}

impl<'a> BlockContext<'a> {
    /// A context with a stopped transport and no controllers.
    pub fn new(round: Round, sample_count: usize, sample_rate: f32) -> Self {
        Self {
            round,
            sample_count,
            sample_rate,
            transport: TransportInfo::stopped(),
            controllers: &[],
        }
    }

    /// Replaces the transport.
    pub fn with_transport(mut self, transport: TransportInfo) -> Self {
        self.transport = transport;
        self
    }

    /// Attaches the shared controllers.
    pub fn with_controllers(mut self, controllers: &'a [MidiController]) -> Self {
        self.controllers = controllers;
        self
    }

    /// Looks up a shared controller.
    #[inline]
    pub fn controller(&self, id: ControllerId) -> Option<&'a MidiController> {
        self.controllers.get(id.index())
    }
}

/// State every producer carries: geometry, output buffer, event queue and
/// memoization bookkeeping.
#[derive(Debug)]
pub struct ProducerCore {
    channels: usize,
    sample_rate: f32,
    block_size: usize,
    buffer: SampleBuffer,
    events: EventQueue,
    last_round: Option<Round>,
    last_sample_count: usize,
    render_count: u64,
}

impl ProducerCore {
    /// A core producing `channels` channels with the default queue capacity.
    pub fn new(channels: usize) -> Self {
        Self::with_queue_capacity(channels, DEFAULT_QUEUE_CAPACITY)
    }

    /// A core with an explicit event queue capacity.
    pub fn with_queue_capacity(channels: usize, queue_capacity: usize) -> Self {
        Self {
            channels,
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: DEFAULT_BLOCK_SIZE,
            buffer: SampleBuffer::new(channels, DEFAULT_BLOCK_SIZE),
            events: EventQueue::new(queue_capacity),
            last_round: None,
            last_sample_count: 0,
            render_count: 0,
        }
    }

    /// Number of output channels.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Session sample rate.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Maximum samples per block.
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// The last rendered output.
    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    /// The producer's event queue.
    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    /// The producer's event queue, mutably.
    pub fn events_mut(&mut self) -> &mut EventQueue {
        &mut self.events
    }

    /// Schedules an event from the audio thread. Returns `false` if dropped.
    #[inline]
    pub fn schedule(&mut self, event: Event) -> bool {
        self.events.push(event)
    }

    /// Creates the control-thread sender of this producer's queue.
    pub fn sender(&mut self) -> EventSender {
        self.events.sender()
    }

    /// Round of the last render, if any.
    pub fn last_round(&self) -> Option<Round> {
        self.last_round
    }

    /// Samples produced in the last render.
    pub fn last_sample_count(&self) -> usize {
        self.last_sample_count
    }

    /// How many times the block-render pass ran. Memoized calls do not count.
    pub fn render_count(&self) -> u64 {
        self.render_count
    }

    /// Whether `round` is already cached.
    #[inline]
    pub fn is_rendered(&self, round: Round) -> bool {
        self.last_round == Some(round)
    }

    /// Sets rate and block size and allocates the buffer and queue.
    pub fn configure(&mut self, sample_rate: f32, block_size: usize) -> Result<(), TryReserveError> {
        self.sample_rate = sample_rate;
        self.block_size = block_size;
        self.buffer.try_configure(self.channels, block_size)?;
        let capacity = self.events.capacity();
        self.events.reserve(capacity)?;
        self.last_round = None;
        Ok(())
    }

    /// Drops pending events, silences the buffer and forgets the last round.
    pub fn reset(&mut self) {
        self.events.clear();
        self.buffer.clear();
        self.last_round = None;
        self.last_sample_count = 0;
    }
}

/// A node of the audio graph.
///
/// Implementations provide [`core`](Self::core), [`core_mut`](Self::core_mut)
/// and [`render`](Self::render); the remaining hooks default to no-ops.
/// Composite producers expose their children through
/// [`for_each_child`](Self::for_each_child) so configuration, reset and
/// transport resets reach the whole subtree.
pub trait SignalProducer {
    /// Shared producer state.
    fn core(&self) -> &ProducerCore;

    /// Shared producer state, mutably.
    fn core_mut(&mut self) -> &mut ProducerCore;

    /// Called once per round before any event is dispatched.
    ///
    /// Composite producers render their children here.
    fn initialize_rendering(&mut self, _ctx: &BlockContext<'_>) {}

    /// Applies one event. Called at the event's offset, before the samples
    /// from that offset are rendered.
    fn handle_event(&mut self, _event: &Event) {}

    /// Writes samples `[first, last)` of every channel of `out`.
    fn render(&mut self, ctx: &BlockContext<'_>, first: usize, last: usize, out: &mut SampleBuffer);

    /// Called once per round after the last segment has been rendered.
    fn finalize_rendering(&mut self, _ctx: &BlockContext<'_>, _sample_count: usize) {}

    /// Visits direct children.
    fn for_each_child(&mut self, _visit: &mut dyn FnMut(&mut dyn SignalProducer)) {}

    /// Resets producer-specific state. Called by [`reset`](Self::reset).
    fn on_reset(&mut self) {}

    /// Reacts to a new sample rate or block size. Called by
    /// [`configure`](Self::configure) after the core is resized.
    fn on_configure(&mut self) -> Result<(), TryReserveError> {
        Ok(())
    }

    /// Reacts to a jump in host time. Defaults to forwarding to children.
    fn on_transport_discontinuity(&mut self) {
        self.for_each_child(&mut |child| child.on_transport_discontinuity());
    }

    /// The last rendered output.
    fn output(&self) -> &SampleBuffer {
        self.core().buffer()
    }

    /// Propagates sample rate and block size through the subtree and
    /// allocates every buffer and queue. Not realtime-safe.
    fn configure(&mut self, sample_rate: f32, block_size: usize) -> Result<(), TryReserveError> {
        self.core_mut().configure(sample_rate, block_size)?;
        self.on_configure()?;

        let mut result = Ok(());
        self.for_each_child(&mut |child| {
            if result.is_ok() {
                result = child.configure(sample_rate, block_size);
            }
        });

        #[cfg(feature = "tracing")]
        tracing::trace!(
            sample_rate,
            block_size,
            channels = self.core().channels(),
            "producer configured"
        );

        result
    }

    /// Clears pending events and internal state of the whole subtree.
    fn reset(&mut self) {
        self.core_mut().reset();
        self.on_reset();
        self.for_each_child(&mut |child| child.reset());
    }
}

/// Renders `producer` for `ctx.round` and returns its output.
///
/// See the [module documentation](self) for the algorithm.
pub fn produce<'p, P>(producer: &'p mut P, ctx: &BlockContext<'_>) -> &'p SampleBuffer
where
    P: SignalProducer + ?Sized,
{
    if producer.core().is_rendered(ctx.round) {
        return producer.core().buffer();
    }

    let sample_count = ctx.sample_count.min(producer.core().block_size());

    producer.core_mut().events.pull_inbox();
    producer.initialize_rendering(ctx);

    let mut buffer = mem::take(&mut producer.core_mut().buffer);
    let mut first = 0;

    loop {
        while let Some(event) = producer.core_mut().events.pop_due(first) {
            producer.handle_event(&event);
        }

        let next = producer
            .core()
            .events
            .next_offset()
            .map_or(sample_count, |offset| offset.min(sample_count));

        if next > first {
            producer.render(ctx, first, next, &mut buffer);
        }
        if next >= sample_count {
            break;
        }
        first = next;
    }

    producer.finalize_rendering(ctx, sample_count);

    let core = producer.core_mut();
    core.buffer = buffer;
    core.events.advance(sample_count);
    core.last_round = Some(ctx.round);
    core.last_sample_count = sample_count;
    core.render_count += 1;

    &producer.core().buffer
}
