//! Event queue with deterministic ordering.

use crate::error::SimError;
use crate::scheduler::Scheduler;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Work item executed by the scheduler loop.
///
/// Receives the scheduler (to schedule follow-up events) and the world it is
/// driving. An `Err` aborts the run.
pub type Callback<W> = Box<dyn FnOnce(&mut Scheduler<W>, &mut W) -> Result<(), SimError>>;

/// Key for ordering events in the queue.
///
/// Events are ordered by:
/// 1. Time (earlier first)
/// 2. Sequence number (FIFO for the same time)
///
/// Sequence numbers are assigned at push time and never reused, so two
/// events due at the same virtual time run in the order they were scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventKey {
    /// When this event should be processed.
    pub time: Duration,
    /// Sequence number for deterministic FIFO ordering.
    pub sequence: u64,
}

/// Ordered collection of pending callbacks.
pub struct EventQueue<W> {
    events: BTreeMap<EventKey, Callback<W>>,
    next_sequence: u64,
}

impl<W> EventQueue<W> {
    pub fn new() -> Self {
        Self {
            events: BTreeMap::new(),
            next_sequence: 0,
        }
    }

    /// Inserts `callback` due at `time` and returns its key.
    pub fn push(&mut self, time: Duration, callback: Callback<W>) -> EventKey {
        let key = EventKey {
            time,
            sequence: self.next_sequence,
        };
        self.next_sequence += 1;
        self.events.insert(key, callback);
        key
    }

    /// Removes a pending event. Returns false if it already ran or was
    /// cancelled before.
    pub fn cancel(&mut self, key: EventKey) -> bool {
        self.events.remove(&key).is_some()
    }

    /// Removes and returns the next event in (time, sequence) order.
    pub fn pop_next(&mut self) -> Option<(EventKey, Callback<W>)> {
        self.events.pop_first()
    }

    /// Key of the next event without removing it.
    pub fn peek_key(&self) -> Option<EventKey> {
        self.events.keys().next().copied()
    }

    /// Sequence number the next pushed event will receive.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn contains(&self, key: EventKey) -> bool {
        self.events.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl<W> Default for EventQueue<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> fmt::Debug for EventQueue<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventQueue")
            .field("pending", &self.events.len())
            .field("next_sequence", &self.next_sequence)
            .field("next_due", &self.peek_key().map(|k| k.time))
            .finish()
    }
}
