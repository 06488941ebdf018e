// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use parking_lot::Mutex;

use crate::event::Event;
use crate::queue::{Deadline, EventId};
use crate::runtime::{LiveTimer, Runtime, TimerCallback};
use crate::{Clock, Interval};

/// Invokes a callback after a due time and then periodically.
///
/// A timer follows the mode of its [`Clock`] at creation:
///
/// - On a live clock the timer runs on the real-time runtime.
/// - On a frozen clock the timer fires while the clock is advanced, once for every due time and
///   period boundary that the advance crosses. If the clock is thawed, the timer keeps firing on
///   real time, starting from what was left of its virtual due time.
///
/// A period of [`Interval::NEVER`] or [`Interval::ZERO`] makes the timer fire once. A due time
/// of [`Interval::NEVER`] keeps the timer idle until [`Timer::change`] arms it.
///
/// Dropping the timer disposes it.
///
/// # Callbacks
///
/// On a frozen clock the callback runs synchronously inside [`ClockControl::advance`][crate::ClockControl::advance]
/// while the clock is locked. The callback may read [`Clock::now`] but must not block, advance, freeze
/// or thaw the clock, create delays or timers on it, or change or dispose timers of the same clock.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use std::sync::atomic::{AtomicU32, Ordering};
/// use std::time::Duration;
///
/// use timewarp::{Clock, ClockControl, Interval};
/// # use timewarp::runtime::{LiveTimer, Runtime, Sleep, TimerCallback};
/// # #[derive(Debug)]
/// # struct NoRuntime;
/// # impl Runtime for NoRuntime {
/// #     fn sleep(&self, _: Duration) -> Sleep { Box::pin(std::future::pending()) }
/// #     fn start_timer(&self, _: TimerCallback, _: Interval, _: Interval) -> Box<dyn LiveTimer> { unimplemented!() }
/// # }
///
/// let clock = Clock::new(NoRuntime);
/// let control = ClockControl::new(&clock)?;
/// control.freeze();
///
/// let ticks = Arc::new(AtomicU32::new(0));
/// let counter = Arc::clone(&ticks);
/// let _timer = clock.timer(
///     move || _ = counter.fetch_add(1, Ordering::Relaxed),
///     Interval::millis(100),
///     Interval::millis(50),
/// );
///
/// control.advance(Duration::from_millis(200))?;
/// assert_eq!(ticks.load(Ordering::Relaxed), 3);
///
/// # Ok::<(), timewarp::Error>(())
/// ```
#[derive(Debug)]
pub struct Timer {
    clock: Clock,
    event: Arc<TimerEvent>,
}

impl Timer {
    pub(crate) fn new(clock: &Clock, callback: TimerCallback, due: Interval, period: Interval) -> Self {
        let engine = clock.engine();
        let id = engine.next_event_id();

        let frozen = engine.with_frozen(|now, queue| {
            let deadline = Deadline::after(now, due);
            let event = Arc::new(TimerEvent::new(
                id,
                Arc::clone(&callback),
                TimerState::Frozen { deadline, period },
            ));
            queue.insert(id, deadline, Event::Timer(Arc::clone(&event)));
            event
        });

        let event = frozen.unwrap_or_else(|| {
            let live = engine.runtime().start_timer(Arc::clone(&callback), due, period);
            Arc::new(TimerEvent::new(id, callback, TimerState::Live(live)))
        });

        Self {
            clock: clock.clone(),
            event,
        }
    }

    /// Changes the due time and period of the timer, measured from the current clock time.
    ///
    /// On a frozen clock the timer moves to its new position among the queued events.
    /// Returns `false` if the timer was disposed, or if its callback panicked during an advance
    /// and the clock has been thawed since.
    pub fn change(&self, due: Interval, period: Interval) -> bool {
        loop {
            match &*self.event.state.lock() {
                TimerState::Live(live) => return live.change(due, period),
                TimerState::Disposed => return false,
                TimerState::Frozen { .. } => {}
            }

            // Queue lock first, timer lock second, the same order as an advance.
            let changed = self.clock.engine().with_frozen(|now, queue| {
                let mut state = self.event.state.lock();

                let TimerState::Frozen { .. } = &*state else {
                    return false;
                };

                let deadline = Deadline::after(now, due);
                *state = TimerState::Frozen { deadline, period };
                queue.insert(self.event.id, deadline, Event::Timer(Arc::clone(&self.event)));
                true
            });

            match changed {
                Some(true) => return true,
                // The state moved on while waiting for the queue.
                Some(false) => {}
                // A thaw hands over every queued timer before the clock turns live, so a timer
                // still frozen here was lost to a panicking callback.
                None if matches!(*self.event.state.lock(), TimerState::Frozen { .. }) => return false,
                None => {}
            }
        }
    }

    /// Stops the timer. Disposing a disposed timer does nothing.
    pub fn dispose(&self) {
        if let TimerState::Frozen { .. } = self.event.dispose() {
            self.clock.engine().unregister(self.event.id);
        }
    }

    /// Returns `true` if the timer was disposed.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        matches!(*self.event.state.lock(), TimerState::Disposed)
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        if let TimerState::Frozen { .. } = self.event.dispose() {
            self.clock.engine().unregister(self.event.id);
        }
    }
}

/// The part of a timer that fires while the clock is frozen.
pub(crate) struct TimerEvent {
    id: EventId,
    callback: TimerCallback,
    state: Mutex<TimerState>,
}

#[derive(Debug)]
enum TimerState {
    Frozen { deadline: Deadline, period: Interval },
    Live(Box<dyn LiveTimer>),
    Disposed,
}

impl fmt::Debug for TimerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerEvent")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl TimerEvent {
    fn new(id: EventId, callback: TimerCallback, state: TimerState) -> Self {
        Self {
            id,
            callback,
            state: Mutex::new(state),
        }
    }

    pub fn deadline(&self) -> Deadline {
        match *self.state.lock() {
            TimerState::Frozen { deadline, .. } => deadline,
            TimerState::Live(_) | TimerState::Disposed => Deadline::Never,
        }
    }

    /// Invokes the callback and moves the deadline forward by one period.
    ///
    /// Returns `false` only if the timer is no longer frozen, such as after a dispose.
    pub fn fire(&self) -> bool {
        if !matches!(*self.state.lock(), TimerState::Frozen { .. }) {
            return false;
        }

        (self.callback)();

        let mut state = self.state.lock();

        let TimerState::Frozen { deadline, period } = &mut *state else {
            return false;
        };

        *deadline = match (*deadline, period.to_duration()) {
            (Deadline::At(fired_at), Some(period)) if !period.is_zero() => next_deadline(fired_at, period),
            _ => Deadline::Never,
        };

        true
    }

    /// Starts a real-time timer for the rest of the virtual due time, keeping the period.
    pub fn thaw(&self, now: SystemTime, runtime: &dyn Runtime) {
        let mut state = self.state.lock();

        let TimerState::Frozen { deadline, period } = *state else {
            return;
        };

        let due = match deadline {
            Deadline::At(deadline) => Interval::saturating_from(deadline.duration_since(now).unwrap_or(Duration::ZERO)),
            Deadline::Never => Interval::NEVER,
        };

        *state = TimerState::Live(runtime.start_timer(Arc::clone(&self.callback), due, period));
    }

    /// Marks the timer disposed and returns its previous state.
    ///
    /// A live timer is disposed by dropping it.
    fn dispose(&self) -> TimerState {
        mem::replace(&mut *self.state.lock(), TimerState::Disposed)
    }
}

fn next_deadline(fired_at: SystemTime, period: Duration) -> Deadline {
    fired_at.checked_add(period).map_or(Deadline::Never, Deadline::At)
}
