// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::{LiveTimer, Runtime, Sleep, TimerCallback};
use crate::Interval;

/// A call made by the clock into its real-time runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RuntimeCall {
    Sleep(Duration),
    TimerStarted { id: usize, due: Interval, period: Interval },
    TimerChanged { id: usize, due: Interval, period: Interval },
    TimerDropped { id: usize },
}

/// A runtime that records every call instead of waiting on real time.
///
/// Sleeps never complete unless they are zero-length. Timers only fire through
/// [`RecordingRuntime::fire_timer`].
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingRuntime {
    recording: Arc<Mutex<Recording>>,
}

#[derive(Default)]
struct Recording {
    calls: Vec<RuntimeCall>,
    callbacks: Vec<TimerCallback>,
}

impl fmt::Debug for Recording {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recording")
            .field("calls", &self.calls)
            .field("timers", &self.callbacks.len())
            .finish()
    }
}

impl RecordingRuntime {
    pub fn calls(&self) -> Vec<RuntimeCall> {
        self.recording.lock().calls.clone()
    }

    /// Invokes the callback of the live timer started as `id`.
    pub fn fire_timer(&self, id: usize) {
        let callback = Arc::clone(&self.recording.lock().callbacks[id]);
        callback();
    }
}

impl Runtime for RecordingRuntime {
    fn sleep(&self, duration: Duration) -> Sleep {
        self.recording.lock().calls.push(RuntimeCall::Sleep(duration));

        if duration.is_zero() {
            Box::pin(std::future::ready(()))
        } else {
            Box::pin(std::future::pending())
        }
    }

    fn start_timer(&self, callback: TimerCallback, due: Interval, period: Interval) -> Box<dyn LiveTimer> {
        let mut recording = self.recording.lock();
        let id = recording.callbacks.len();
        recording.callbacks.push(callback);
        recording.calls.push(RuntimeCall::TimerStarted { id, due, period });

        Box::new(RecordingTimer {
            id,
            recording: Arc::clone(&self.recording),
        })
    }
}

#[derive(Debug)]
struct RecordingTimer {
    id: usize,
    recording: Arc<Mutex<Recording>>,
}

impl LiveTimer for RecordingTimer {
    fn change(&self, due: Interval, period: Interval) -> bool {
        self.recording
            .lock()
            .calls
            .push(RuntimeCall::TimerChanged { id: self.id, due, period });
        true
    }
}

impl Drop for RecordingTimer {
    fn drop(&mut self) {
        self.recording.lock().calls.push(RuntimeCall::TimerDropped { id: self.id });
    }
}
