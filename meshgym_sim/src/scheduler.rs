//! Virtual clock and single-threaded scheduler loop.
//!
//! The scheduler owns the total order of causality for a run:
//! - one-shot events on an [`EventQueue`] keyed by (time, sequence)
//! - periodic timers built on top of one-shot events
//! - a loop that pops the next-due event, moves the clock to its due time
//!   and invokes it with the world it drives
//!
//! The world `W` is not owned by the scheduler; [`Scheduler::run`] borrows it
//! and lends it to each callback in turn, so there is exactly one writer per
//! event and no shared mutable state between callbacks.

use crate::error::SimError;
use crate::queue::{Callback, EventKey, EventQueue};
use meshgym_env::{ActionScheduler, DeferredAction};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, trace};

/// Handle to a scheduled one-shot event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventHandle {
    key: EventKey,
}

impl EventHandle {
    /// Virtual time the event is due at.
    pub fn due(&self) -> Duration {
        self.key.time
    }

    pub fn key(&self) -> EventKey {
        self.key
    }
}

/// Identifier of a periodic timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timer#{}", self.0)
    }
}

type PeriodicCallback<W> =
    Rc<RefCell<dyn FnMut(&mut Scheduler<W>, &mut W) -> Result<(), SimError>>>;

/// Counters collected over the scheduler's lifetime.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// One-shot events pushed (timer firings included)
    pub events_scheduled: u64,
    /// Events whose callback returned successfully
    pub events_processed: u64,
    /// Pending events removed before they ran
    pub events_cancelled: u64,
    /// Periodic timers created
    pub timers_created: u64,
    /// Periodic timer firings
    pub timer_firings: u64,
}

/// Outcome of one [`Scheduler::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Events executed during this call
    pub events_processed: u64,
    /// Clock value when the loop halted
    pub final_time: Duration,
    /// True if a callback called [`Scheduler::stop`]
    pub stopped_early: bool,
}

/// Discrete-event scheduler driving a world of type `W`.
pub struct Scheduler<W> {
    queue: EventQueue<W>,
    now: Duration,
    timers: HashMap<TimerId, EventKey>,
    next_timer: u64,
    stop_requested: bool,
    stats: SchedulerStats,
}

impl<W: 'static> Scheduler<W> {
    /// Creates a scheduler with the clock at zero.
    pub fn new() -> Self {
        Self {
            queue: EventQueue::new(),
            now: Duration::ZERO,
            timers: HashMap::new(),
            next_timer: 0,
            stop_requested: false,
            stats: SchedulerStats::default(),
        }
    }

    /// Current virtual time.
    ///
    /// While a callback runs this equals the callback's due time.
    pub fn now(&self) -> Duration {
        self.now
    }

    pub fn stats(&self) -> &SchedulerStats {
        &self.stats
    }

    /// Number of events waiting in the queue.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Schedules `callback` to run `delay` after the current time.
    pub fn schedule<F>(&mut self, delay: Duration, callback: F) -> EventHandle
    where
        F: FnOnce(&mut Scheduler<W>, &mut W) -> Result<(), SimError> + 'static,
    {
        let at = self.now.saturating_add(delay);
        self.push(at, Box::new(callback))
    }

    /// Schedules `callback` at an absolute virtual time.
    ///
    /// A time before [`Scheduler::now`] is a causality violation and is
    /// rejected; callers propagate the error, which aborts the run.
    pub fn schedule_at<F>(&mut self, at: Duration, callback: F) -> Result<EventHandle, SimError>
    where
        F: FnOnce(&mut Scheduler<W>, &mut W) -> Result<(), SimError> + 'static,
    {
        if at < self.now {
            return Err(SimError::CausalityViolation { at, now: self.now });
        }
        Ok(self.push(at, Box::new(callback)))
    }

    fn push(&mut self, at: Duration, callback: Callback<W>) -> EventHandle {
        let key = self.queue.push(at, callback);
        self.stats.events_scheduled += 1;
        trace!(at = ?at, seq = key.sequence, "Scheduled event");
        EventHandle { key }
    }

    /// Cancels a pending event. Cancelling an event that already ran (or was
    /// already cancelled) is a no-op and returns false.
    pub fn cancel(&mut self, handle: EventHandle) -> bool {
        let removed = self.queue.cancel(handle.key);
        if removed {
            self.stats.events_cancelled += 1;
        }
        removed
    }

    /// Returns true if the event has neither run nor been cancelled.
    pub fn is_pending(&self, handle: EventHandle) -> bool {
        self.queue.contains(handle.key)
    }

    /// Runs `callback` every `interval`, starting `first_delay` from now.
    ///
    /// Each firing re-arms the next one at `now + interval` *before* invoking
    /// the callback, so the cadence holds regardless of what the callback
    /// schedules or how long it blocks in real time.
    pub fn schedule_periodic<F>(
        &mut self,
        first_delay: Duration,
        interval: Duration,
        callback: F,
    ) -> Result<TimerId, SimError>
    where
        F: FnMut(&mut Scheduler<W>, &mut W) -> Result<(), SimError> + 'static,
    {
        if interval.is_zero() {
            return Err(SimError::InvalidInterval(interval));
        }

        let id = TimerId(self.next_timer);
        self.next_timer += 1;
        self.stats.timers_created += 1;

        let callback: PeriodicCallback<W> = Rc::new(RefCell::new(callback));
        self.arm(id, first_delay, interval, callback);
        Ok(id)
    }

    fn arm(&mut self, id: TimerId, delay: Duration, interval: Duration, callback: PeriodicCallback<W>) {
        let handle = self.schedule(delay, move |scheduler: &mut Scheduler<W>, world: &mut W| {
            scheduler.arm(id, interval, interval, Rc::clone(&callback));
            scheduler.stats.timer_firings += 1;

            let mut tick = callback
                .try_borrow_mut()
                .map_err(|_| SimError::ReentrantTimer(id.0))?;
            (*tick)(scheduler, world)
        });
        self.timers.insert(id, handle.key);
    }

    /// Stops a periodic timer. Returns false if it was unknown or already
    /// cancelled.
    pub fn cancel_timer(&mut self, id: TimerId) -> bool {
        match self.timers.remove(&id) {
            Some(key) => {
                let removed = self.queue.cancel(key);
                if removed {
                    self.stats.events_cancelled += 1;
                }
                removed
            }
            None => false,
        }
    }

    /// Halts the running loop once the current callback returns.
    pub fn stop(&mut self) {
        self.stop_requested = true;
    }

    /// Drains the queue up to `stop_time`.
    ///
    /// Events due before `stop_time` always run. Events due exactly at
    /// `stop_time` run only if they were scheduled before this call: the stop
    /// point is ordered like an event pushed at call time. When the loop
    /// halts on the stop point or an empty queue, the clock is left at
    /// `stop_time`; when a callback calls [`Scheduler::stop`], it stays at
    /// that callback's due time.
    ///
    /// A callback error is returned as-is and ends the run; the world cannot
    /// be trusted after a partial callback.
    pub fn run(&mut self, stop_time: Duration, world: &mut W) -> Result<RunSummary, SimError> {
        if stop_time < self.now {
            return Err(SimError::CausalityViolation {
                at: stop_time,
                now: self.now,
            });
        }

        let horizon = EventKey {
            time: stop_time,
            sequence: self.queue.next_sequence(),
        };
        self.stop_requested = false;
        let mut processed = 0;

        debug!(now = ?self.now, stop_time = ?stop_time, pending = self.queue.len(), "Scheduler run");

        while !self.stop_requested {
            match self.queue.peek_key() {
                Some(key) if key < horizon => {}
                _ => break,
            }
            let Some((key, callback)) = self.queue.pop_next() else {
                break;
            };

            debug_assert!(key.time >= self.now, "clock moved backwards");
            self.now = key.time;
            trace!(now = ?self.now, seq = key.sequence, "Executing event");

            callback(self, world)?;
            processed += 1;
            self.stats.events_processed += 1;
        }

        let stopped_early = self.stop_requested;
        self.stop_requested = false;
        if !stopped_early {
            self.now = stop_time;
        }

        debug!(
            events = processed,
            final_time = ?self.now,
            stopped_early,
            "Scheduler halted"
        );

        Ok(RunSummary {
            events_processed: processed,
            final_time: self.now,
            stopped_early,
        })
    }
}

impl<W: 'static> Default for Scheduler<W> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W> fmt::Debug for Scheduler<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now)
            .field("queue", &self.queue)
            .field("timers", &self.timers.len())
            .finish()
    }
}

impl<W: 'static> ActionScheduler<W> for Scheduler<W> {
    fn now(&self) -> Duration {
        self.now
    }

    fn defer(&mut self, delay: Duration, apply: DeferredAction<W>) {
        self.schedule(delay, move |_, world| {
            apply(world);
            Ok(())
        });
    }
}
