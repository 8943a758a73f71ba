//! Per-producer event queues.
//!
//! A queue has two halves:
//!
//! - [`EventQueue`] lives inside the producer and is touched only by the audio
//!   thread. It keeps pending events sorted by `(time_offset, insertion
//!   order)` in a fixed-capacity deque.
//! - [`EventSender`] is the control-thread half, backed by a lock-free SPSC
//!   ring. The audio side pulls the ring into the sorted deque at the start of
//!   every render.
//!
//! Both halves are bounded. A full queue drops the *newest* event and bumps
//! a shared overflow counter; pushing never blocks and never allocates.

use alloc::collections::{TryReserveError, VecDeque};
use alloc::sync::Arc;
use core::sync::atomic::{AtomicU64, Ordering};

use ringbuf::traits::{Consumer, Observer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};

use crate::event::{Event, EventTag};

/// Default number of pending events per producer.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Control-thread handle for scheduling events into one producer.
///
/// There is exactly one sender per queue; multiple control-thread writers
/// must be serialized by the owner of the sender.
pub struct EventSender {
    producer: HeapProd<Event>,
    overflow: Arc<AtomicU64>,
}

impl EventSender {
    /// Schedules an event. Returns `false` if the queue was full and the event
    /// was dropped.
    ///
    /// One slot is always kept free for [`clear`](Self::clear).
    pub fn push(&mut self, event: Event) -> bool {
        if self.producer.vacant_len() <= 1 {
            self.overflow.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        self.producer.try_push(event).is_ok()
    }

    /// Asks the audio side to discard every event pushed before this call.
    ///
    /// Events pushed afterwards are kept.
    pub fn clear(&mut self) {
        // A failed push means the reserved slot already holds a clear marker.
        let _ = self.producer.try_push(Event::new(EventTag::CLEAR_QUEUE, 0));
    }

    /// Total number of events dropped because the queue was full.
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}

impl core::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventSender")
            .field("queued", &self.producer.occupied_len())
            .field("overflow", &self.overflow_count())
            .finish()
    }
}

/// Audio-thread event queue of a single producer.
pub struct EventQueue {
    pending: VecDeque<Event>,
    capacity: usize,
    inbox: Option<HeapCons<Event>>,
    overflow: Arc<AtomicU64>,
}

impl EventQueue {
    /// Creates a queue holding up to `capacity` pending events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity,
            inbox: None,
            overflow: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Creates the control-thread half of this queue.
    ///
    /// Construction-time only: allocates the ring. Calling it again replaces
    /// the previous sender's ring, which then feeds nothing.
    pub fn sender(&mut self) -> EventSender {
        let (producer, consumer) = HeapRb::<Event>::new(self.capacity + 1).split();
        self.inbox = Some(consumer);

        #[cfg(feature = "tracing")]
        tracing::trace!(capacity = self.capacity, "event_queue: sender connected");

        EventSender {
            producer,
            overflow: Arc::clone(&self.overflow),
        }
    }

    /// Ensures room for `capacity` pending events without reallocating later.
    pub fn reserve(&mut self, capacity: usize) -> Result<(), TryReserveError> {
        self.capacity = capacity.max(1);
        let additional = self.capacity.saturating_sub(self.pending.len());
        self.pending.try_reserve_exact(additional)
    }

    /// Pushes an event from the audio thread.
    ///
    /// The event is placed after every pending event with the same or an
    /// earlier offset. Returns `false` and counts an overflow if full.
    pub fn push(&mut self, event: Event) -> bool {
        if self.pending.len() >= self.capacity {
            self.overflow.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        let index = self
            .pending
            .partition_point(|e| e.time_offset <= event.time_offset);
        self.pending.insert(index, event);
        true
    }

    /// Moves control-thread events into the pending list.
    ///
    /// Clear markers are honoured even when the pending list is full. Events
    /// that do not fit and are not followed by a marker stay in the ring for
    /// the next block.
    pub fn pull_inbox(&mut self) {
        let Some(inbox) = self.inbox.as_mut() else {
            return;
        };
        while !inbox.is_empty() {
            if self.pending.len() >= self.capacity {
                if !inbox.iter().any(|e| e.tag == EventTag::CLEAR_QUEUE) {
                    break;
                }
                // Everything ahead of the marker is discarded by it.
                while let Some(event) = inbox.try_pop() {
                    if event.tag == EventTag::CLEAR_QUEUE {
                        self.pending.clear();
                        break;
                    }
                }
                continue;
            }
            let Some(event) = inbox.try_pop() else {
                break;
            };
            if event.tag == EventTag::CLEAR_QUEUE {
                self.pending.clear();
                continue;
            }
            let index = self
                .pending
                .partition_point(|e| e.time_offset <= event.time_offset);
            self.pending.insert(index, event);
        }
    }

    /// Discards every event with `time_offset < before`.
    pub fn drop_before(&mut self, before: u32) {
        self.pending.retain(|e| e.time_offset >= before);
    }

    /// Discards every pending event, including ones not yet pulled from the
    /// control thread.
    pub fn clear(&mut self) {
        self.pending.clear();
        if let Some(inbox) = self.inbox.as_mut() {
            inbox.clear();
        }
    }

    /// Removes and returns, in order, every event with
    /// `time_offset < block_size`.
    pub fn drain(&mut self, block_size: usize) -> impl Iterator<Item = Event> + '_ {
        let due = self
            .pending
            .partition_point(|e| (e.time_offset as usize) < block_size);
        self.pending.drain(..due)
    }

    /// Pops the first event if it is due at or before `offset`.
    #[inline]
    pub fn pop_due(&mut self, offset: usize) -> Option<Event> {
        match self.pending.front() {
            Some(event) if event.offset() <= offset => self.pending.pop_front(),
            _ => None,
        }
    }

    /// Offset of the earliest pending event.
    #[inline]
    pub fn next_offset(&self) -> Option<usize> {
        self.pending.front().map(Event::offset)
    }

    /// Shifts the remaining events into the next block.
    pub fn advance(&mut self, block_size: usize) {
        let shift = block_size as u32;
        for event in &mut self.pending {
            event.time_offset = event.time_offset.saturating_sub(shift);
        }
    }

    /// Pending events, in dispatch order.
    pub fn iter(&self) -> impl Iterator<Item = &Event> {
        self.pending.iter()
    }

    /// Number of pending events.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether no events are pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Maximum number of pending events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Events dropped on either side because the queue was full.
    pub fn overflow_count(&self) -> u64 {
        self.overflow.load(Ordering::Relaxed)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl core::fmt::Debug for EventQueue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.pending.len())
            .field("capacity", &self.capacity)
            .field("connected", &self.inbox.is_some())
            .finish()
    }
}
