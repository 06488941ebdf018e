// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::time::Duration;

use jiff::SignedDuration;

use crate::{Error, Result};

/// The largest interval accepted by the clock, in milliseconds.
pub const MAX_INTERVAL_MILLIS: u32 = u32::MAX - 1;

/// A due time or period expressed in whole milliseconds, or "never".
///
/// Intervals are used by [`Clock::delay`][crate::Clock::delay], [`Clock::timer`][crate::Clock::timer]
/// and [`Timer::change`][crate::Timer::change]. All numeric entry points normalize into this
/// type with the same rules:
///
/// - `-1` means [`Interval::NEVER`]: the delay never completes, the timer never fires or never repeats.
/// - `0` means [`Interval::ZERO`]: complete or fire immediately, or do not repeat.
/// - Any other value must be within `0..=4294967294` milliseconds.
///
/// Durations are truncated to whole milliseconds before the range check.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use timewarp::Interval;
///
/// assert_eq!(Interval::try_from(-1_i64)?, Interval::NEVER);
/// assert_eq!(Interval::try_from(Duration::from_micros(2500))?, Interval::millis(2));
/// assert_eq!(Interval::from(u32::MAX), Interval::NEVER);
/// assert!(Interval::try_from(-2_i32).is_err());
///
/// # Ok::<(), timewarp::Error>(())
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Interval(Option<u32>);

impl Interval {
    /// The interval that never elapses.
    pub const NEVER: Self = Self(None);

    /// The interval that elapses immediately.
    pub const ZERO: Self = Self(Some(0));

    /// Creates an interval of the given number of milliseconds.
    ///
    /// `u32::MAX` is the unsigned spelling of -1 and maps to [`Interval::NEVER`].
    #[must_use]
    pub const fn millis(millis: u32) -> Self {
        if millis == u32::MAX { Self::NEVER } else { Self(Some(millis)) }
    }

    /// Creates an interval from a duration, clamping it to [`MAX_INTERVAL_MILLIS`].
    #[must_use]
    pub fn saturating_from(duration: Duration) -> Self {
        let millis = u32::try_from(duration.as_millis()).map_or(MAX_INTERVAL_MILLIS, |millis| millis.min(MAX_INTERVAL_MILLIS));
        Self(Some(millis))
    }

    /// Returns `true` if this interval never elapses.
    #[must_use]
    pub const fn is_never(self) -> bool {
        self.0.is_none()
    }

    /// Returns the number of milliseconds, or `None` for [`Interval::NEVER`].
    #[must_use]
    pub const fn as_millis(self) -> Option<u32> {
        self.0
    }

    /// Returns the interval as a duration, or `None` for [`Interval::NEVER`].
    #[must_use]
    pub fn to_duration(self) -> Option<Duration> {
        self.0.map(|millis| Duration::from_millis(u64::from(millis)))
    }

    /// Returns the signed representation, with -1 standing for [`Interval::NEVER`].
    #[must_use]
    pub fn as_raw(self) -> i64 {
        self.0.map_or(-1, i64::from)
    }
}

impl fmt::Debug for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(millis) => write!(f, "{millis}ms"),
            None => f.write_str("never"),
        }
    }
}

impl From<u32> for Interval {
    fn from(millis: u32) -> Self {
        Self::millis(millis)
    }
}

impl TryFrom<i64> for Interval {
    type Error = Error;

    fn try_from(millis: i64) -> Result<Self> {
        if millis == -1 {
            return Ok(Self::NEVER);
        }

        match u32::try_from(millis) {
            Ok(valid) if valid <= MAX_INTERVAL_MILLIS => Ok(Self(Some(valid))),
            _ => Err(Error::out_of_range(millis)),
        }
    }
}

impl TryFrom<i32> for Interval {
    type Error = Error;

    fn try_from(millis: i32) -> Result<Self> {
        Self::try_from(i64::from(millis))
    }
}

impl TryFrom<Duration> for Interval {
    type Error = Error;

    fn try_from(duration: Duration) -> Result<Self> {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        Self::try_from(millis)
    }
}

impl TryFrom<SignedDuration> for Interval {
    type Error = Error;

    fn try_from(duration: SignedDuration) -> Result<Self> {
        // `as_millis` truncates towards zero, so -1.5ms becomes -1 (never) and -0.5ms becomes 0.
        let millis = duration.as_millis();
        let millis = i64::try_from(millis).unwrap_or(if millis < 0 { i64::MIN } else { i64::MAX });
        Self::try_from(millis)
    }
}
