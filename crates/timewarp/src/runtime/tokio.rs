// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::{LiveTimer, Runtime, Sleep, TimerCallback};
use crate::Interval;

/// Real-time primitives driven by a Tokio runtime.
///
/// Delays sleep on the Tokio timer wheel and every timer runs as a spawned task. The runtime
/// handle is captured on construction, so delays and timers can be created, and the clock can
/// be thawed, from threads outside of the runtime.
#[derive(Debug, Clone)]
pub struct TokioRuntime {
    handle: Handle,
}

impl TokioRuntime {
    /// Creates a runtime bound to the Tokio runtime of the current context.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime context.
    #[must_use]
    pub fn current() -> Self {
        Self::new(Handle::current())
    }

    /// Creates a runtime bound to the given Tokio runtime handle.
    #[must_use]
    pub const fn new(handle: Handle) -> Self {
        Self { handle }
    }
}

impl Runtime for TokioRuntime {
    fn sleep(&self, duration: Duration) -> Sleep {
        let _guard = self.handle.enter();
        Box::pin(tokio::time::sleep(duration))
    }

    fn start_timer(&self, callback: TimerCallback, due: Interval, period: Interval) -> Box<dyn LiveTimer> {
        let (changes, receiver) = watch::channel((due, period));
        let task = self.handle.spawn(run_timer(callback, receiver));

        Box::new(TokioTimer { changes, task })
    }
}

#[derive(Debug)]
struct TokioTimer {
    changes: watch::Sender<(Interval, Interval)>,
    task: JoinHandle<()>,
}

impl LiveTimer for TokioTimer {
    fn change(&self, due: Interval, period: Interval) -> bool {
        !self.task.is_finished() && self.changes.send((due, period)).is_ok()
    }
}

impl Drop for TokioTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn first_tick(due: Interval) -> Option<Instant> {
    due.to_duration().and_then(|due| Instant::now().checked_add(due))
}

#[cfg_attr(test, mutants::skip)] // Mutations stall the timer task forever.
async fn run_timer(callback: TimerCallback, mut changes: watch::Receiver<(Interval, Interval)>) {
    let (due, mut period) = *changes.borrow_and_update();
    let mut next = first_tick(due);

    loop {
        let Some(deadline) = next else {
            // Idle until reconfigured; the sender is gone once the timer is disposed.
            if changes.changed().await.is_err() {
                return;
            }

            let (due, new_period) = *changes.borrow_and_update();
            period = new_period;
            next = first_tick(due);
            continue;
        };

        tokio::select! {
            () = tokio::time::sleep_until(deadline) => {
                callback();

                // Fixed rate; a late tick fires once and then falls back into step.
                next = period
                    .to_duration()
                    .filter(|period| !period.is_zero())
                    .and_then(|period| deadline.checked_add(period))
                    .map(|tick| tick.max(Instant::now()));
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    return;
                }

                let (due, new_period) = *changes.borrow_and_update();
                period = new_period;
                next = first_tick(due);
            }
        }
    }
}
