// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use crate::error::ErrorKind;
use crate::{Clock, Error, Result};

static LAST_CONTROL_ID: AtomicU64 = AtomicU64::new(0);

/// Controls the flow of time of a [`Clock`] in tests.
///
/// A clock accepts one active control at a time; the control value is the ownership token.
/// Creating a second control while the first one is alive fails, and releasing or dropping the
/// active control thaws the clock and lets another control take over.
///
/// # Examples
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
/// // Only one control at a time.
/// assert!(ClockControl::new(&clock).unwrap_err().is_invalid_operation());
///
/// control.freeze_at(jiff::Timestamp::from_second(1_000_000)?);
/// control.advance_millis(1500)?;
///
/// assert_eq!(
///     clock.now(),
///     SystemTime::UNIX_EPOCH + Duration::from_millis(1_000_001_500)
/// );
///
/// control.release()?;
/// assert!(!clock.is_frozen());
///
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct ClockControl {
    clock: Clock,
    id: u64,
    released: bool,
}

impl ClockControl {
    /// Takes control of the flow of time of `clock`.
    ///
    /// # Errors
    ///
    /// Fails with an invalid operation error if another control of the same clock is active.
    pub fn new(clock: &Clock) -> Result<Self> {
        let id = LAST_CONTROL_ID.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        clock.engine().claim(id)?;

        Ok(Self {
            clock: clock.clone(),
            id,
            released: false,
        })
    }

    /// Returns the controlled clock.
    #[must_use]
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Freezes the clock at the current system time.
    ///
    /// Freezing a frozen clock moves its virtual time to the current system time.
    pub fn freeze(&self) {
        self.clock.engine().freeze(None);
    }

    /// Freezes the clock at `at`.
    ///
    /// Freezing a frozen clock moves its virtual time to `at`. Queued delays and timers keep
    /// their deadlines.
    pub fn freeze_at(&self, at: impl Into<SystemTime>) {
        self.clock.engine().freeze(Some(at.into()));
    }

    /// Moves the virtual time forward by `by`, completing delays and firing timers that become due.
    ///
    /// Timer callbacks run on the calling thread before this returns.
    ///
    /// # Errors
    ///
    /// Fails with an invalid operation error if the clock is not frozen, and with
    /// [`ErrorKind::TimeOverflow`] if the new time cannot be represented. Time does not move
    /// in either case.
    pub fn advance(&self, by: Duration) -> Result<()> {
        self.clock.engine().advance(by)
    }

    /// Moves the virtual time forward by `millis` milliseconds.
    ///
    /// # Errors
    ///
    /// Fails with an invalid argument error if `millis` is negative, otherwise as [`ClockControl::advance`].
    pub fn advance_millis(&self, millis: i64) -> Result<()> {
        let Ok(forward) = u64::try_from(millis) else {
            return Err(Error::from_kind(ErrorKind::NegativeAdvance(millis)));
        };

        self.advance(Duration::from_millis(forward))
    }

    /// Makes the clock live again, handing queued delays and timers over to real time.
    pub fn thaw(&self) {
        self.clock.engine().thaw();
    }

    /// Returns `true` if the clock is frozen.
    #[must_use]
    pub fn is_frozen(&self) -> bool {
        self.clock.is_frozen()
    }

    /// Thaws the clock and gives up control of it.
    ///
    /// # Errors
    ///
    /// Fails with an invalid operation error if this control is no longer the active control of
    /// the clock.
    pub fn release(mut self) -> Result<()> {
        self.release_core()
    }

    fn release_core(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }

        self.released = true;
        self.clock.engine().release(self.id)
    }
}

impl Drop for ClockControl {
    fn drop(&mut self) {
        if let Err(error) = self.release_core() {
            tracing::event!(
                name: "timewarp.control.release_failed",
                tracing::Level::WARN,
                control.id = self.id,
                error.message = %error,
                "failed to release clock control",
            );
        }
    }
}
