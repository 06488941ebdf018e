// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Real-time primitives that the clock falls back to when time is not frozen.
//!
//! The clock never waits on its own. While live, and after a thaw, every delay and timer is
//! handed to a [`Runtime`]:
//!
//! 1. [`Runtime::sleep`] backs delays with a real monotonic wait.
//! 2. [`Runtime::start_timer`] backs timers with a real repeating callback, returned as a
//!    [`LiveTimer`] that can be reconfigured and is disposed when dropped.
//!
//! With the `tokio` feature, [`TokioRuntime`] implements both on top of the Tokio timer wheel.
//! Other async runtimes can plug in their own implementation through [`Clock::new`][crate::Clock::new].
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//!
//! use timewarp::runtime::{LiveTimer, Runtime, Sleep, TimerCallback};
//! use timewarp::{Clock, Interval};
//!
//! #[derive(Debug)]
//! struct NoopTimer;
//!
//! impl LiveTimer for NoopTimer {
//!     fn change(&self, _due: Interval, _period: Interval) -> bool {
//!         true
//!     }
//! }
//!
//! #[derive(Debug)]
//! struct NoopRuntime;
//!
//! impl Runtime for NoopRuntime {
//!     fn sleep(&self, _duration: Duration) -> Sleep {
//!         Box::pin(std::future::pending())
//!     }
//!
//!     fn start_timer(&self, _callback: TimerCallback, _due: Interval, _period: Interval) -> Box<dyn LiveTimer> {
//!         Box::new(NoopTimer)
//!     }
//! }
//!
//! let clock = Clock::new(NoopRuntime);
//! assert!(!clock.is_frozen());
//! ```

use std::fmt::Debug;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::Interval;

#[cfg(test)]
pub(crate) mod recording;
#[cfg(any(feature = "tokio", test))]
mod tokio;

#[cfg(any(feature = "tokio", test))]
#[cfg_attr(docsrs, doc(cfg(feature = "tokio")))]
pub use self::tokio::TokioRuntime;

/// A real monotonic wait produced by [`Runtime::sleep`].
pub type Sleep = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// The callback invoked each time a timer fires.
///
/// The callback state is whatever the closure captures.
pub type TimerCallback = Arc<dyn Fn() + Send + Sync + 'static>;

/// Real-time primitives used by a [`Clock`][crate::Clock] that is not frozen.
pub trait Runtime: Debug + Send + Sync + 'static {
    /// Returns a future that completes once `duration` of real time has elapsed.
    fn sleep(&self, duration: Duration) -> Sleep;

    /// Starts a timer that invokes `callback` once `due` has elapsed and then every `period`.
    ///
    /// A `due` of [`Interval::NEVER`] keeps the timer idle until it is changed. A `period` of
    /// [`Interval::NEVER`] or [`Interval::ZERO`] fires the callback at most once.
    fn start_timer(&self, callback: TimerCallback, due: Interval, period: Interval) -> Box<dyn LiveTimer>;
}

/// A timer running on real time. Dropping it disposes the timer.
pub trait LiveTimer: Debug + Send + Sync {
    /// Restarts the timer with a new due time and period, measured from now.
    ///
    /// Returns `false` if the timer can no longer fire.
    fn change(&self, due: Interval, period: Interval) -> bool;
}
