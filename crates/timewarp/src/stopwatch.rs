// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, SystemTime};

use super::Clock;

/// Measures the time elapsed on a [`Clock`].
///
/// While the clock is frozen the stopwatch measures virtual time, so it only moves when the
/// clock is advanced. An instance of `Stopwatch` is created by calling [`Clock::stopwatch()`]
/// or by passing a [`Clock`] to the [`Stopwatch::new()`] constructor.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use timewarp::Clock;
///
/// # fn measure(clock: &Clock) -> Duration {
/// let stopwatch = clock.stopwatch();
/// // Perform some operation...
/// stopwatch.elapsed()
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Stopwatch {
    clock: Clock,
    start: SystemTime,
}

impl Stopwatch {
    /// Creates a stopwatch that starts at the current time of `clock`.
    ///
    /// > **Note**: Consider using [`Clock::stopwatch()`] as a shortcut for creating stopwatches.
    #[must_use]
    pub fn new(clock: &Clock) -> Self {
        Self {
            clock: clock.clone(),
            start: clock.now(),
        }
    }

    /// Returns the time at which the stopwatch started.
    #[must_use]
    pub fn started_at(&self) -> SystemTime {
        self.start
    }

    /// Returns the elapsed time since the stopwatch was created.
    ///
    /// Returns [`Duration::ZERO`] if the clock now reports an earlier time, such as after
    /// freezing it in the past.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.clock.now().duration_since(self.start).unwrap_or(Duration::ZERO)
    }
}

impl From<Stopwatch> for Duration {
    fn from(stopwatch: Stopwatch) -> Self {
        stopwatch.elapsed()
    }
}
