// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use crate::interval::MAX_INTERVAL_MILLIS;

/// The result type for fallible operations that use the [`Error`] type.
pub type Result<T> = std::result::Result<T, Error>;

/// An error that can occur when working with the clock.
///
/// Errors fall into two broad groups:
///
/// * Invalid arguments, such as an interval outside of `-1..=4294967294` milliseconds.
///   See [`Error::is_invalid_argument`].
/// * Invalid operations, such as advancing time while the clock is live or creating a
///   second [`ClockControl`][crate::ClockControl] for a clock. See [`Error::is_invalid_operation`].
///
/// Cancellation of a [`Delay`][crate::Delay] is not an error; it is reported through
/// [`Cancelled`][crate::Cancelled].
///
/// # Examples
///
/// ```
/// use timewarp::Interval;
///
/// let error = Interval::try_from(-2_i64).unwrap_err();
/// assert!(error.is_invalid_argument());
/// ```
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct Error(#[from] ErrorKind);

/// The kind of an [`Error`].
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// An interval is below -1 or above the largest supported interval.
    #[error("interval must be -1 (never) or between 0 and {max} milliseconds, got {0}", max = MAX_INTERVAL_MILLIS)]
    OutOfRange(i64),

    /// The clock was asked to move backwards.
    #[error("time can only be advanced forward, got {0} milliseconds")]
    NegativeAdvance(i64),

    /// Time was advanced while the clock was live.
    #[error("cannot advance time when time is not frozen")]
    NotFrozen,

    /// A clock control was created while another one is active.
    #[error("competing clock controls: another control is already active for this clock")]
    CompetingControllers,

    /// A clock control was released but it does not hold the clock.
    #[error("the clock control is not the active control of the clock")]
    NotActiveController,

    /// Advancing the clock would move it outside of the range supported by `SystemTime`.
    #[error("advancing the clock by {0:?} moves it outside of the supported time range")]
    TimeOverflow(Duration),

    /// A future did not complete before its timeout elapsed.
    #[error("future timed out")]
    TimedOut,

    /// The current time cannot be represented as a zoned timestamp.
    #[error(transparent)]
    Jiff(#[from] jiff::Error),
}

impl Error {
    pub(crate) const fn from_kind(kind: ErrorKind) -> Self {
        Self(kind)
    }

    pub(crate) const fn out_of_range(value: i64) -> Self {
        Self::from_kind(ErrorKind::OutOfRange(value))
    }

    /// Returns the kind of this error.
    #[must_use]
    pub const fn kind(&self) -> &ErrorKind {
        &self.0
    }

    /// Returns `true` if the error was caused by an argument outside of its accepted range.
    #[must_use]
    pub const fn is_invalid_argument(&self) -> bool {
        matches!(self.0, ErrorKind::OutOfRange(_) | ErrorKind::NegativeAdvance(_))
    }

    /// Returns `true` if the error was caused by an operation that is not valid in the current
    /// state of the clock.
    #[must_use]
    pub const fn is_invalid_operation(&self) -> bool {
        matches!(
            self.0,
            ErrorKind::NotFrozen | ErrorKind::CompetingControllers | ErrorKind::NotActiveController
        )
    }
}

impl From<jiff::Error> for Error {
    fn from(error: jiff::Error) -> Self {
        Self::from_kind(ErrorKind::Jiff(error))
    }
}
