// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::{Clock, Interval, Timeout};

/// Extensions for the [`Future`] trait.
pub trait FutureExt: Future {
    /// Applies a timeout to the future.
    ///
    /// The timeout is a [`Delay`][crate::Delay] on `clock`, so it elapses when a frozen clock is
    /// advanced past it. Timeouts too long for an [`Interval`] never elapse.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    ///
    /// use timewarp::{Clock, FutureExt, Interval};
    ///
    /// # async fn timeout_example(clock: &Clock) {
    /// // Create a long-running future
    /// let future = clock.delay(Interval::millis(700));
    ///
    /// // Apply a timeout to the future and await it
    /// let timeout_error = future
    ///     .timeout(Duration::from_millis(200), &clock)
    ///     .await
    ///     .unwrap_err();
    ///
    /// assert_eq!(timeout_error.to_string(), "future timed out");
    /// # }
    /// ```
    fn timeout(self, timeout: Duration, clock: &Clock) -> Timeout<Self>
    where
        Self: Sized,
    {
        let interval = Interval::try_from(timeout).unwrap_or(Interval::NEVER);
        Timeout::new(self, clock.delay(interval))
    }
}

impl<T> FutureExt for T where T: Future {}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::task;

    use futures::FutureExt as _;

    use super::*;
    use crate::ClockControl;
    use crate::error::ErrorKind;
    use crate::runtime::recording::RecordingRuntime;

    #[test]
    fn timeout_control() {
        let clock = Clock::new(RecordingRuntime::default());
        let control = ClockControl::new(&clock).unwrap();
        control.freeze();

        let future = clock.delay(Interval::millis(10_000));
        let mut future = future.timeout(Duration::from_secs(1), &clock);

        // First poll at 0 seconds - no timeout yet.
        let mut cx = task::Context::from_waker(task::Waker::noop());
        let result = future.poll_unpin(&mut cx);
        assert!(result.is_pending());

        control.advance(Duration::from_secs(1)).unwrap();

        // Second poll at 1 second - timed out.
        let result = future.poll_unpin(&mut cx);

        let task::Poll::Ready(Err(timeout_error)) = result else {
            panic!("Expected a timeout error");
        };

        assert!(matches!(timeout_error.kind(), ErrorKind::TimedOut));
        assert_eq!(timeout_error.to_string(), "future timed out");
    }

    #[test]
    fn timeout_happy_path() {
        let clock = Clock::new(RecordingRuntime::default());
        let control = ClockControl::new(&clock).unwrap();
        control.freeze();

        let future = clock.delay(Interval::millis(10)).map(|outcome| outcome.map(|()| 10));
        let mut future = future.timeout(Duration::from_secs(1), &clock);

        control.advance(Duration::from_millis(10)).unwrap();

        let mut cx = task::Context::from_waker(task::Waker::noop());
        let task::Poll::Ready(Ok(Ok(value))) = future.poll_unpin(&mut cx) else {
            panic!("Expected the inner future to complete");
        };

        assert_eq!(value, 10);
    }

    #[test]
    fn oversized_timeout_never_elapses() {
        let clock = Clock::new(RecordingRuntime::default());
        let control = ClockControl::new(&clock).unwrap();
        control.freeze();

        let mut future = std::future::pending::<()>().timeout(Duration::MAX, &clock);
        control.advance(Duration::from_secs(u64::from(u32::MAX))).unwrap();

        let mut cx = task::Context::from_waker(task::Waker::noop());
        assert!(future.poll_unpin(&mut cx).is_pending());
        assert_eq!(clock.pending_events(), 0);
    }

    #[cfg(not(miri))]
    #[tokio::test]
    async fn timeout_on_tokio() {
        let clock = Clock::new_tokio();

        let future = async {
            clock.delay(Interval::millis(10_000)).await.unwrap();
        };

        let error = future.timeout(Duration::from_millis(10), &clock).await.unwrap_err();

        assert_eq!(error.to_string(), "future timed out");
    }
}
