// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::SystemTime;

use crate::delay::DelayEvent;
use crate::queue::Deadline;
use crate::runtime::Runtime;
use crate::timer::TimerEvent;

/// An event waiting in the queue of a frozen clock.
///
/// The handle that created the event owns it; the queue only keeps a shared reference
/// so that it can fire or thaw the event.
#[derive(Debug, Clone)]
pub(crate) enum Event {
    Delay(Arc<DelayEvent>),
    Timer(Arc<TimerEvent>),
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Delay(_) => "delay",
            Self::Timer(_) => "timer",
        }
    }

    /// The current deadline, read from the event itself.
    pub fn deadline(&self) -> Deadline {
        match self {
            Self::Delay(delay) => Deadline::At(delay.deadline()),
            Self::Timer(timer) => timer.deadline(),
        }
    }

    /// Fires the event because virtual time reached its deadline.
    ///
    /// Returns `true` if the event must be queued again at its new [`Event::deadline`].
    pub fn fire(&self) -> bool {
        match self {
            Self::Delay(delay) => {
                delay.fire();
                false
            }
            Self::Timer(timer) => timer.fire(),
        }
    }

    /// Hands the event over to real time, honoring what is left of its virtual deadline at `now`.
    pub fn thaw(&self, now: SystemTime, runtime: &dyn Runtime) {
        match self {
            Self::Delay(delay) => delay.thaw(now),
            Self::Timer(timer) => timer.thaw(now, runtime),
        }
    }
}
