// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};

use crate::event::Event;
use crate::queue::{Deadline, EventId};
use crate::runtime::Sleep;
use crate::{Clock, Interval};

/// The outcome of a [`Delay`] whose cancellation token was cancelled before the delay elapsed.
///
/// Cancellation is a regular outcome rather than an [`Error`][crate::Error].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cancelled;

impl fmt::Display for Cancelled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the delay was cancelled")
    }
}

impl std::error::Error for Cancelled {}

/// Asynchronously waits until the clock has moved forward by an interval.
///
/// A delay follows the mode of its [`Clock`] at creation:
///
/// - On a live clock the delay sleeps on the real-time runtime.
/// - On a frozen clock the delay completes once the clock is advanced past its deadline.
///   If the clock is thawed first, the delay sleeps for whatever was left of its virtual
///   interval at the moment of the thaw.
///
/// A delay of [`Interval::ZERO`][crate::Interval::ZERO] completes immediately and a delay of
/// [`Interval::NEVER`][crate::Interval::NEVER] never completes, unless it is cancelled.
///
/// Dropping a delay before it completes removes it from the clock.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use futures::FutureExt;
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
/// let mut delay = clock.delay(Interval::millis(100));
/// assert!((&mut delay).now_or_never().is_none());
///
/// control.advance(Duration::from_millis(100))?;
/// assert_eq!(delay.now_or_never(), Some(Ok(())));
///
/// # Ok::<(), timewarp::Error>(())
/// ```
#[must_use = "a delay does nothing unless polled"]
pub struct Delay {
    clock: Clock,
    repr: DelayRepr,
    cancellation: Option<Pin<Box<WaitForCancellationFutureOwned>>>,
}

enum DelayRepr {
    Ready(Result<(), Cancelled>),
    Forever,
    Sleeping(Sleep),
    Frozen(Arc<DelayEvent>),
}

impl fmt::Debug for Delay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delay")
            .field("repr", &self.repr)
            .field("cancellable", &self.cancellation.is_some())
            .finish_non_exhaustive()
    }
}

impl fmt::Debug for DelayRepr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(outcome) => f.debug_tuple("Ready").field(outcome).finish(),
            Self::Forever => f.write_str("Forever"),
            Self::Sleeping(_) => f.write_str("Sleeping"),
            Self::Frozen(event) => f.debug_tuple("Frozen").field(event).finish(),
        }
    }
}

impl Delay {
    pub(crate) fn new(clock: &Clock, interval: Interval, cancellation: Option<CancellationToken>) -> Self {
        if cancellation.as_ref().is_some_and(CancellationToken::is_cancelled) {
            return Self::with_repr(clock, DelayRepr::Ready(Err(Cancelled)), None);
        }

        let repr = match interval.to_duration() {
            None => DelayRepr::Forever,
            Some(duration) if duration.is_zero() => DelayRepr::Ready(Ok(())),
            Some(duration) => Self::schedule(clock, duration, cancellation.as_ref()),
        };

        Self::with_repr(clock, repr, cancellation)
    }

    fn schedule(clock: &Clock, duration: Duration, cancellation: Option<&CancellationToken>) -> DelayRepr {
        let engine = clock.engine();

        let frozen = engine.with_frozen(|now, queue| {
            // A deadline past the end of time never elapses.
            let deadline = now.checked_add(duration)?;
            let event = Arc::new(DelayEvent::new(engine.next_event_id(), deadline, cancellation.cloned()));
            queue.insert(event.id, Deadline::At(deadline), Event::Delay(Arc::clone(&event)));
            Some(event)
        });

        match frozen {
            Some(Some(event)) => DelayRepr::Frozen(event),
            Some(None) => DelayRepr::Forever,
            None => DelayRepr::Sleeping(engine.runtime().sleep(duration)),
        }
    }

    fn with_repr(clock: &Clock, repr: DelayRepr, cancellation: Option<CancellationToken>) -> Self {
        let cancellation = match repr {
            DelayRepr::Ready(_) => None,
            _ => cancellation.map(|token| Box::pin(token.cancelled_owned())),
        };

        Self {
            clock: clock.clone(),
            repr,
            cancellation,
        }
    }

    fn poll_cancelled(&mut self, cx: &mut Context<'_>) -> bool {
        self.cancellation
            .as_mut()
            .is_some_and(|cancelled| cancelled.as_mut().poll(cx).is_ready())
    }

    fn cancel(&mut self) -> Result<(), Cancelled> {
        match &self.repr {
            DelayRepr::Frozen(event) => {
                let outcome = event.cancel();
                self.clock.engine().unregister(event.id);
                outcome
            }
            DelayRepr::Ready(outcome) => *outcome,
            DelayRepr::Forever | DelayRepr::Sleeping(_) => Err(Cancelled),
        }
    }
}

enum Step {
    Pending,
    Done(Result<(), Cancelled>),
    Sleep(Duration),
}

impl Future for Delay {
    type Output = Result<(), Cancelled>;

    #[cfg_attr(test, mutants::skip)] // Some mutations never complete.
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        loop {
            let step = match &mut this.repr {
                DelayRepr::Ready(outcome) => return Poll::Ready(*outcome),
                DelayRepr::Forever => Step::Pending,
                DelayRepr::Sleeping(sleep) => match sleep.as_mut().poll(cx) {
                    Poll::Ready(()) => Step::Done(Ok(())),
                    Poll::Pending => Step::Pending,
                },
                DelayRepr::Frozen(event) => event.poll_state(cx.waker()),
            };

            match step {
                Step::Done(outcome) => {
                    this.repr = DelayRepr::Ready(outcome);
                    this.cancellation = None;
                    return Poll::Ready(outcome);
                }
                Step::Sleep(remaining) => {
                    this.repr = DelayRepr::Sleeping(this.clock.engine().runtime().sleep(remaining));
                }
                Step::Pending => {
                    if !this.poll_cancelled(cx) {
                        return Poll::Pending;
                    }

                    let outcome = this.cancel();
                    this.repr = DelayRepr::Ready(outcome);
                    this.cancellation = None;
                    return Poll::Ready(outcome);
                }
            }
        }
    }
}

impl Drop for Delay {
    fn drop(&mut self) {
        if let DelayRepr::Frozen(event) = &self.repr {
            event.abandon();
            self.clock.engine().unregister(event.id);
        }
    }
}

/// The queued part of a delay created on a frozen clock.
#[derive(Debug)]
pub(crate) struct DelayEvent {
    id: EventId,
    deadline: SystemTime,
    cancellation: Option<CancellationToken>,
    state: Mutex<DelayState>,
}

#[derive(Debug)]
enum DelayState {
    Pending(Option<Waker>),
    Fired,
    Cancelled,
    Thawed { since: Instant, remaining: Duration },
}

impl DelayEvent {
    fn new(id: EventId, deadline: SystemTime, cancellation: Option<CancellationToken>) -> Self {
        Self {
            id,
            deadline,
            cancellation,
            state: Mutex::new(DelayState::Pending(None)),
        }
    }

    pub fn deadline(&self) -> SystemTime {
        self.deadline
    }

    fn is_cancelled(&self) -> bool {
        self.cancellation.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Resolves a pending delay, as cancelled if its token was cancelled in the meantime.
    pub fn fire(&self) {
        let outcome = if self.is_cancelled() { DelayState::Cancelled } else { DelayState::Fired };
        self.resolve(outcome);
    }

    /// Switches a pending delay to a real-time sleep for the rest of its interval.
    pub fn thaw(&self, now: SystemTime) {
        let outcome = if self.is_cancelled() {
            DelayState::Cancelled
        } else {
            DelayState::Thawed {
                since: Instant::now(),
                remaining: self.deadline.duration_since(now).unwrap_or(Duration::ZERO),
            }
        };

        self.resolve(outcome);
    }

    /// Cancels a pending delay and returns its final outcome.
    fn cancel(&self) -> Result<(), Cancelled> {
        self.resolve(DelayState::Cancelled);

        match *self.state.lock() {
            DelayState::Fired => Ok(()),
            _ => Err(Cancelled),
        }
    }

    fn abandon(&self) {
        self.resolve(DelayState::Cancelled);
    }

    fn resolve(&self, outcome: DelayState) {
        let mut state = self.state.lock();

        let DelayState::Pending(waker) = &mut *state else {
            return;
        };

        let waker = waker.take();
        *state = outcome;
        drop(state);

        if let Some(waker) = waker {
            waker.wake();
        }
    }

    fn poll_state(&self, waker: &Waker) -> Step {
        let mut state = self.state.lock();

        match &mut *state {
            DelayState::Pending(registered) => {
                if !registered.as_ref().is_some_and(|registered| registered.will_wake(waker)) {
                    *registered = Some(waker.clone());
                }
                Step::Pending
            }
            DelayState::Fired => Step::Done(Ok(())),
            DelayState::Cancelled => Step::Done(Err(Cancelled)),
            DelayState::Thawed { since, remaining } => Step::Sleep(remaining.saturating_sub(since.elapsed())),
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;
    use crate::ClockControl;
    use crate::runtime::recording::{RecordingRuntime, RuntimeCall};

    fn frozen_clock() -> (Clock, ClockControl, RecordingRuntime) {
        let runtime = RecordingRuntime::default();
        let clock = Clock::new(runtime.clone());
        let control = ClockControl::new(&clock).unwrap();
        control.freeze_at(SystemTime::UNIX_EPOCH);
        (clock, control, runtime)
    }

    fn poll(delay: &mut Delay) -> Poll<Result<(), Cancelled>> {
        delay.poll_unpin(&mut Context::from_waker(Waker::noop()))
    }

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Delay: Send, Unpin);
        static_assertions::assert_impl_all!(Cancelled: Send, Sync, Copy, std::error::Error);
    }

    #[test]
    fn cancelled_display() {
        assert_eq!(Cancelled.to_string(), "the delay was cancelled");
    }

    #[test]
    fn zero_completes_immediately() {
        let (clock, _control, _) = frozen_clock();

        let mut delay = clock.delay(Interval::ZERO);

        assert_eq!(poll(&mut delay), Poll::Ready(Ok(())));
        assert_eq!(clock.pending_events(), 0);
    }

    #[test]
    fn frozen_delay_completes_on_advance() {
        let (clock, control, runtime) = frozen_clock();

        let mut delay = clock.delay(Interval::millis(100));
        assert_eq!(clock.pending_events(), 1);
        assert_eq!(poll(&mut delay), Poll::Pending);

        control.advance(Duration::from_millis(99)).unwrap();
        assert_eq!(poll(&mut delay), Poll::Pending);

        control.advance(Duration::from_millis(1)).unwrap();
        assert_eq!(poll(&mut delay), Poll::Ready(Ok(())));
        assert_eq!(poll(&mut delay), Poll::Ready(Ok(())));

        assert_eq!(clock.pending_events(), 0);
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn advance_wakes_waiting_task() {
        let (clock, control, _) = frozen_clock();
        let delay = clock.delay(Interval::millis(10));

        let task = std::thread::spawn(move || futures::executor::block_on(delay));
        control.advance(Duration::from_millis(10)).unwrap();

        assert_eq!(task.join().unwrap(), Ok(()));
        assert_eq!(clock.pending_events(), 0);
    }

    #[test]
    fn never_ignores_advance() {
        let (clock, control, _) = frozen_clock();

        let mut delay = clock.delay(Interval::NEVER);
        assert_eq!(clock.pending_events(), 0);

        control.advance(Duration::from_secs(u64::from(u32::MAX) * 1000)).unwrap();
        assert_eq!(poll(&mut delay), Poll::Pending);
    }

    #[test]
    fn never_can_be_cancelled() {
        let (clock, _control, _) = frozen_clock();
        let token = CancellationToken::new();

        let mut delay = clock.delay_with_cancellation(Interval::NEVER, token.clone());
        assert_eq!(poll(&mut delay), Poll::Pending);

        token.cancel();
        assert_eq!(poll(&mut delay), Poll::Ready(Err(Cancelled)));
    }

    #[test]
    fn precancelled_is_never_scheduled() {
        let (clock, _control, runtime) = frozen_clock();
        let token = CancellationToken::new();
        token.cancel();

        let mut delay = clock.delay_with_cancellation(Interval::millis(10), token);

        assert_eq!(clock.pending_events(), 0);
        assert_eq!(poll(&mut delay), Poll::Ready(Err(Cancelled)));
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn cancel_on_poll_removes_event() {
        let (clock, _control, _) = frozen_clock();
        let token = CancellationToken::new();

        let mut delay = clock.delay_with_cancellation(Interval::millis(10), token.clone());
        assert_eq!(poll(&mut delay), Poll::Pending);

        token.cancel();
        assert_eq!(clock.pending_events(), 1);
        assert_eq!(poll(&mut delay), Poll::Ready(Err(Cancelled)));
        assert_eq!(clock.pending_events(), 0);
    }

    #[test]
    fn cancel_observed_on_advance() {
        let (clock, control, _) = frozen_clock();
        let token = CancellationToken::new();

        let mut delay = clock.delay_with_cancellation(Interval::millis(10), token.clone());
        token.cancel();

        control.advance(Duration::from_millis(10)).unwrap();

        assert_eq!(clock.pending_events(), 0);
        assert_eq!(poll(&mut delay), Poll::Ready(Err(Cancelled)));
    }

    #[test]
    fn fired_delay_ignores_late_cancellation() {
        let (clock, control, _) = frozen_clock();
        let token = CancellationToken::new();

        let mut delay = clock.delay_with_cancellation(Interval::millis(10), token.clone());
        control.advance(Duration::from_millis(10)).unwrap();
        token.cancel();

        assert_eq!(poll(&mut delay), Poll::Ready(Ok(())));
    }

    #[test]
    fn thawed_delay_sleeps_for_remaining_interval() {
        let (clock, control, runtime) = frozen_clock();

        let mut delay = clock.delay(Interval::millis(300));
        control.advance(Duration::from_millis(100)).unwrap();
        control.thaw();

        assert_eq!(clock.pending_events(), 0);
        assert_eq!(poll(&mut delay), Poll::Pending);

        let [RuntimeCall::Sleep(remaining)] = runtime.calls()[..] else {
            panic!("expected a single sleep, got {:?}", runtime.calls());
        };
        assert!(remaining <= Duration::from_millis(200));
        assert!(remaining > Duration::from_millis(100));
    }

    #[test]
    fn overdue_thawed_delay_completes() {
        let (clock, control, runtime) = frozen_clock();

        let mut delay = clock.delay(Interval::millis(5));
        control.freeze_at(SystemTime::UNIX_EPOCH + Duration::from_millis(10));
        control.thaw();

        assert_eq!(poll(&mut delay), Poll::Ready(Ok(())));
        assert_eq!(runtime.calls(), [RuntimeCall::Sleep(Duration::ZERO)]);
    }

    #[test]
    fn thaw_resolves_cancelled_delay() {
        let (clock, control, runtime) = frozen_clock();
        let token = CancellationToken::new();

        let mut delay = clock.delay_with_cancellation(Interval::millis(10), token.clone());
        token.cancel();
        control.thaw();

        assert_eq!(poll(&mut delay), Poll::Ready(Err(Cancelled)));
        assert!(runtime.calls().is_empty());
    }

    #[test]
    fn live_delay_sleeps_on_runtime() {
        let runtime = RecordingRuntime::default();
        let clock = Clock::new(runtime.clone());

        let mut delay = clock.delay(Interval::millis(25));

        assert_eq!(poll(&mut delay), Poll::Pending);
        assert_eq!(clock.pending_events(), 0);
        assert_eq!(runtime.calls(), [RuntimeCall::Sleep(Duration::from_millis(25))]);
    }

    #[test]
    fn drop_removes_event() {
        let (clock, _control, _) = frozen_clock();

        let delay = clock.delay(Interval::millis(10));
        assert_eq!(clock.pending_events(), 1);

        drop(delay);
        assert_eq!(clock.pending_events(), 0);
    }
}
