// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::SystemTime;

use jiff::tz::TimeZone;
use jiff::{Timestamp, Zoned};
use tokio_util::sync::CancellationToken;

use crate::engine::Engine;
use crate::runtime::Runtime;
use crate::{Delay, Interval, Result, Stopwatch, Timer};

/// Provides the current time, delays, and timers, any of which can be frozen and advanced in tests.
///
/// The clock is either live or frozen:
///
/// - A live clock reports the system time and hands delays and timers to its real-time
///   [`Runtime`].
/// - A frozen clock reports a virtual time that only moves when a
///   [`ClockControl`][crate::ClockControl] advances it. Delays and timers created while
///   frozen wait in a queue and complete or fire as the virtual time crosses their deadlines.
///
/// Thawing the clock hands every waiting delay and timer over to real time, keeping what was
/// left of its virtual interval.
///
/// # Cloning and shared state
///
/// Cloning a clock is inexpensive (just an `Arc` clone) and every clone shares the same mode,
/// virtual time, and queue. Freezing or advancing through one clone is observed by all others.
///
/// # Examples
///
/// ## Freeze and advance time
///
/// ```
/// use std::time::{Duration, SystemTime};
///
/// use timewarp::{Clock, ClockControl};
/// # use timewarp::Interval;
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
///
/// control.freeze_at(SystemTime::UNIX_EPOCH);
/// control.advance(Duration::from_secs(10))?;
///
/// assert_eq!(clock.now(), SystemTime::UNIX_EPOCH + Duration::from_secs(10));
///
/// # Ok::<(), timewarp::Error>(())
/// ```
///
/// ## Delay operations
///
/// ```
/// use timewarp::{Clock, Interval};
///
/// # async fn delay_example(clock: &Clock) {
/// let stopwatch = clock.stopwatch();
///
/// // Delay for 10 milliseconds
/// clock.delay(Interval::millis(10)).await.unwrap();
///
/// assert!(stopwatch.elapsed().as_millis() >= 10);
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Clock(Arc<Engine>);

impl Clock {
    /// Creates a live clock that falls back to `runtime` for real-time waits.
    #[must_use]
    pub fn new(runtime: impl Runtime) -> Self {
        Self(Arc::new(Engine::new(runtime)))
    }

    /// Creates a live clock driven by the Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[cfg(any(feature = "tokio", test))]
    #[cfg_attr(docsrs, doc(cfg(feature = "tokio")))]
    #[must_use]
    pub fn new_tokio() -> Self {
        Self::new(crate::runtime::TokioRuntime::current())
    }

    /// Returns the current time: the virtual time if frozen, the system time otherwise.
    ///
    /// Reading the time of a live clock never takes a lock.
    #[must_use]
    pub fn now(&self) -> SystemTime {
        self.0.now()
    }

    /// Returns the current time as a UTC [`Zoned`] timestamp.
    ///
    /// # Errors
    ///
    /// Fails if the current time is outside of the range supported by [`Timestamp`].
    pub fn now_offset(&self) -> Result<Zoned> {
        let timestamp = Timestamp::try_from(self.now())?;
        Ok(timestamp.to_zoned(TimeZone::UTC))
    }

    /// Returns `true` if the clock is frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.0.is_frozen()
    }

    /// Returns the number of delays and timers waiting for a frozen clock to advance.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.0.pending_events()
    }

    /// Creates a [`Delay`] that completes once the clock moves forward by `interval`.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use timewarp::{Clock, Interval};
    ///
    /// # async fn delay_example(clock: &Clock) -> Result<(), Box<dyn std::error::Error>> {
    /// clock.delay(Interval::try_from(Duration::from_millis(10))?).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn delay(&self, interval: Interval) -> Delay {
        Delay::new(self, interval, None)
    }

    /// Creates a [`Delay`] that completes once the clock moves forward by `interval`, or resolves
    /// to [`Cancelled`][crate::Cancelled] once `cancellation` is cancelled.
    ///
    /// A token that is already cancelled produces a cancelled delay without scheduling anything.
    ///
    /// Cancelling the token later does not remove a frozen delay from the clock right away.
    /// The cancellation is observed, and the delay leaves the queue, at the earliest of its next
    /// poll, an advance that reaches its deadline, or a thaw. Until then it is counted by
    /// [`Clock::pending_events`].
    ///
    /// # Examples
    ///
    /// ```
    /// use timewarp::{Cancelled, Clock, Interval};
    /// use tokio_util::sync::CancellationToken;
    ///
    /// # async fn cancel_example(clock: &Clock) {
    /// let token = CancellationToken::new();
    /// token.cancel();
    ///
    /// let outcome = clock.delay_with_cancellation(Interval::millis(10), token).await;
    /// assert_eq!(outcome, Err(Cancelled));
    /// # }
    /// ```
    pub fn delay_with_cancellation(&self, interval: Interval, cancellation: CancellationToken) -> Delay {
        Delay::new(self, interval, Some(cancellation))
    }

    /// Creates a [`Timer`] that invokes `callback` once `due` has elapsed and then every `period`.
    #[must_use = "dropping the timer disposes it"]
    pub fn timer(&self, callback: impl Fn() + Send + Sync + 'static, due: Interval, period: Interval) -> Timer {
        Timer::new(self, Arc::new(callback), due, period)
    }

    /// Creates a [`Timer`] that does not fire until [`Timer::change`] arms it.
    #[must_use = "dropping the timer disposes it"]
    pub fn idle_timer(&self, callback: impl Fn() + Send + Sync + 'static) -> Timer {
        self.timer(callback, Interval::NEVER, Interval::NEVER)
    }

    /// Creates a [`Stopwatch`] that measures the time elapsed on this clock.
    #[must_use]
    pub fn stopwatch(&self) -> Stopwatch {
        Stopwatch::new(self)
    }

    pub(crate) fn engine(&self) -> &Engine {
        &self.0
    }
}

impl AsRef<Self> for Clock {
    fn as_ref(&self) -> &Self {
        self
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::ClockControl;
    use crate::runtime::recording::RecordingRuntime;

    fn clock() -> Clock {
        Clock::new(RecordingRuntime::default())
    }

    #[test]
    fn assert_types() {
        static_assertions::assert_impl_all!(Clock: Send, Sync, Clone, AsRef<Clock>);
    }

    #[test]
    fn live_now_follows_system_time() {
        let clock = clock();
        let before = SystemTime::now();

        let now = clock.now();

        assert!(now >= before);
        assert!(now <= SystemTime::now());
        assert!(!clock.is_frozen());
    }

    #[test]
    fn clones_share_state() {
        let clock = clock();
        let clone = clock.clone();
        let control = ClockControl::new(&clock).unwrap();

        control.freeze_at(SystemTime::UNIX_EPOCH);

        assert!(clone.is_frozen());
        assert_eq!(clone.now(), SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn now_offset_is_utc() {
        let clock = clock();
        let control = ClockControl::new(&clock).unwrap();
        control.freeze_at(SystemTime::UNIX_EPOCH + Duration::from_secs(86_400));

        let zoned = clock.now_offset().unwrap();

        assert_eq!(zoned.offset(), jiff::tz::Offset::UTC);
        assert_eq!(zoned.timestamp(), Timestamp::from_second(86_400).unwrap());
        assert_eq!(SystemTime::from(zoned.timestamp()), clock.now());
    }

    #[test]
    fn now_offset_out_of_range() {
        let clock = clock();
        let control = ClockControl::new(&clock).unwrap();
        control.freeze_at(SystemTime::UNIX_EPOCH + Duration::from_secs(1 << 40));

        let error = clock.now_offset().unwrap_err();

        assert!(matches!(error.kind(), crate::ErrorKind::Jiff(_)));
    }

    #[test]
    fn equal_deadlines_fire_in_creation_order() {
        let clock = clock();
        let control = ClockControl::new(&clock).unwrap();
        control.freeze();

        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let timers: Vec<_> = ["t1", "t2", "t3"]
            .into_iter()
            .map(|name| {
                let order = Arc::clone(&order);
                clock.timer(move || order.lock().push(name), Interval::millis(100), Interval::NEVER)
            })
            .collect();

        control.advance(Duration::from_millis(100)).unwrap();

        assert_eq!(*order.lock(), ["t1", "t2", "t3"]);
        drop(timers);
    }

    #[test]
    fn delays_and_timers_share_one_queue() {
        let clock = clock();
        let control = ClockControl::new(&clock).unwrap();
        control.freeze();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _timer = clock.timer(move || _ = counter.fetch_add(1, Ordering::SeqCst), Interval::millis(5), Interval::NEVER);
        let _delay = clock.delay(Interval::millis(5));

        assert_eq!(clock.pending_events(), 2);

        control.advance(Duration::from_millis(5)).unwrap();

        // The fired one-shot timer stays queued until it is disposed or the clock is thawed.
        assert_eq!(clock.pending_events(), 1);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn refreeze_after_thaw_starts_empty() {
        let clock = clock();
        let control = ClockControl::new(&clock).unwrap();
        control.freeze();

        let _delay = clock.delay(Interval::millis(5));
        control.thaw();
        control.freeze();

        assert_eq!(clock.pending_events(), 0);
    }

    #[tokio::test]
    async fn new_tokio_is_live() {
        let clock = Clock::new_tokio();

        assert!(!clock.is_frozen());
        clock.delay(Interval::millis(1)).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn thawed_timer_keeps_its_phase() {
        let clock = Clock::new_tokio();
        let control = ClockControl::new(&clock).unwrap();
        control.freeze();

        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        let _timer = clock.timer(move || _ = counter.fetch_add(1, Ordering::SeqCst), Interval::millis(250), Interval::millis(25));

        control.advance(Duration::from_millis(250)).unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        control.thaw();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 2);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn thawed_delay_waits_for_the_remainder() {
        let clock = Clock::new_tokio();
        let control = ClockControl::new(&clock).unwrap();
        control.freeze();

        let delay = clock.delay(Interval::millis(300));
        control.advance(Duration::from_millis(100)).unwrap();
        control.thaw();

        let started = tokio::time::Instant::now();
        delay.await.unwrap();

        assert!(started.elapsed() >= Duration::from_millis(150));
        assert!(started.elapsed() < Duration::from_millis(250));
    }
}
