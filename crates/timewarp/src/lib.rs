// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(
    test,
    allow(
        clippy::arithmetic_side_effects,
        clippy::unchecked_time_subtraction,
        reason = "allow these lints in tests to improve the readability of the tests"
    )
)]
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! A clock that tests can freeze, advance, and thaw, with delays and timers that follow it.
//!
//! Code under test asks a [`Clock`] for the current time, for [`Delay`]s, and for [`Timer`]s.
//! While the clock is live these pass straight through to real time. A test takes a
//! [`ClockControl`] to freeze the clock, and from then on time only moves when the test
//! advances it: every delay and timer whose deadline is crossed completes or fires, in deadline
//! order, before the advance returns. Thawing the clock hands everything still waiting over to
//! real time, keeping what was left of its virtual interval.
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::time::Duration;
//!
//! use futures::FutureExt;
//! use timewarp::{Clock, ClockControl, Interval};
//! # use timewarp::runtime::{LiveTimer, Runtime, Sleep, TimerCallback};
//! # #[derive(Debug)]
//! # struct NoRuntime;
//! # impl Runtime for NoRuntime {
//! #     fn sleep(&self, _: Duration) -> Sleep { Box::pin(std::future::pending()) }
//! #     fn start_timer(&self, _: TimerCallback, _: Interval, _: Interval) -> Box<dyn LiveTimer> { unimplemented!() }
//! # }
//!
//! let clock = Clock::new(NoRuntime);
//! let control = ClockControl::new(&clock)?;
//! control.freeze();
//!
//! let ticks = Arc::new(AtomicU32::new(0));
//! let counter = Arc::clone(&ticks);
//! let timer = clock.timer(
//!     move || _ = counter.fetch_add(1, Ordering::Relaxed),
//!     Interval::millis(100),
//!     Interval::millis(50),
//! );
//! let mut delay = clock.delay(Interval::millis(120));
//!
//! // Fires the timer at 100, 150 and 200 and completes the delay at 120.
//! control.advance_millis(200)?;
//!
//! assert_eq!(ticks.load(Ordering::Relaxed), 3);
//! assert_eq!((&mut delay).now_or_never(), Some(Ok(())));
//!
//! // Stop the timer and make the clock live again.
//! drop(timer);
//! control.release()?;
//! assert!(!clock.is_frozen());
//!
//! # Ok::<(), timewarp::Error>(())
//! ```
//!
//! # Overview
//!
//! - [`Clock`] - The shared clock. Reports the current time and creates delays, timers and
//!   stopwatches.
//! - [`ClockControl`] - The single owner allowed to freeze, advance and thaw a clock.
//! - [`Interval`] - A due time or period in whole milliseconds, or "never".
//! - [`Delay`] - A future that completes once the clock has moved forward by an interval.
//! - [`Timer`] - A callback invoked after a due time and then periodically.
//! - [`Stopwatch`] - Measures elapsed clock time.
//! - [`FutureExt`] - Applies clock-driven timeouts to futures.
//! - [`Error`] - Represents an error that can occur when working with the clock.
//! - [`runtime`] - The real-time primitives a live clock falls back to.
//!
//! # Timer callbacks
//!
//! While the clock is frozen, timer callbacks run synchronously inside
//! [`ClockControl::advance`] with the clock locked. Callbacks may read [`Clock::now`] but must
//! not block or call back into the clock in any other way; doing so deadlocks.
//!
//! # Features
//!
//! - **`tokio`** - Integration with the [Tokio](https://tokio.rs/) runtime. Enables
//!   [`Clock::new_tokio`] and [`runtime::TokioRuntime`].

mod clock;
mod clock_control;
mod delay;
mod engine;
mod error;
mod event;
mod future_ext;
mod interval;
mod queue;
mod stopwatch;
mod timer;

pub mod runtime;
pub(crate) mod timeout;

pub use clock::Clock;
pub use clock_control::ClockControl;
pub use delay::{Cancelled, Delay};
pub use error::{Error, ErrorKind, Result};
pub use future_ext::FutureExt;
pub use interval::{Interval, MAX_INTERVAL_MILLIS};
pub use stopwatch::Stopwatch;
pub use timeout::Timeout;
pub use timer::Timer;
