// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, ThreadId};
use std::time::{Duration, SystemTime};

use parking_lot::{Mutex, RwLock};

use crate::error::ErrorKind;
use crate::event::Event;
use crate::queue::{EventId, EventQueue};
use crate::runtime::Runtime;
use crate::{Error, Result};

/// Controller id that marks the controller slot as free.
const NO_CONTROLLER: u64 = 0;

/// The state shared by all clones of a [`Clock`][crate::Clock].
///
/// The queue mutex serializes every mutation of the mode, the virtual time, and the queue.
/// The mode is mirrored in an atomic so that reading the time of a live clock never locks,
/// and the virtual time sits behind its own lock so that timer callbacks, which run while the
/// queue is locked, can still read it.
#[derive(Debug)]
pub(crate) struct Engine {
    frozen: AtomicBool,
    virtual_now: RwLock<SystemTime>,
    queue: Mutex<EventQueue<Event>>,
    last_event_id: AtomicU64,
    controller: AtomicU64,
    firing: Mutex<Firing>,
    runtime: Box<dyn Runtime>,
}

/// The thread running the fire loop of an advance, and the removals its callbacks requested.
#[derive(Debug, Default)]
struct Firing {
    thread: Option<ThreadId>,
    removals: Vec<EventId>,
}

/// Marks the current thread as firing events until dropped, even if a callback panics.
struct FiringGuard<'a>(&'a Mutex<Firing>);

impl<'a> FiringGuard<'a> {
    fn enter(firing: &'a Mutex<Firing>) -> Self {
        firing.lock().thread = Some(thread::current().id());
        Self(firing)
    }

    fn take_removals(&self) -> Vec<EventId> {
        std::mem::take(&mut self.0.lock().removals)
    }
}

impl Drop for FiringGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().thread = None;
    }
}

impl Engine {
    pub fn new(runtime: impl Runtime) -> Self {
        Self {
            frozen: AtomicBool::new(false),
            virtual_now: RwLock::new(SystemTime::UNIX_EPOCH),
            queue: Mutex::new(EventQueue::default()),
            last_event_id: AtomicU64::new(0),
            controller: AtomicU64::new(NO_CONTROLLER),
            firing: Mutex::new(Firing::default()),
            runtime: Box::new(runtime),
        }
    }

    pub fn runtime(&self) -> &dyn Runtime {
        &*self.runtime
    }

    pub fn next_event_id(&self) -> EventId {
        EventId::new(self.last_event_id.fetch_add(1, Ordering::Relaxed).wrapping_add(1))
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(Ordering::Acquire)
    }

    pub fn now(&self) -> SystemTime {
        if self.is_frozen() {
            *self.virtual_now.read()
        } else {
            SystemTime::now()
        }
    }

    pub fn pending_events(&self) -> usize {
        self.queue.lock().len()
    }

    /// Runs `f` with the virtual time and the queue if the clock is frozen.
    ///
    /// The mode is checked without the lock first and again under it, so a live clock never
    /// contends on the queue. Returns `None` if the clock is live.
    pub fn with_frozen<R>(&self, f: impl FnOnce(SystemTime, &mut EventQueue<Event>) -> R) -> Option<R> {
        if !self.is_frozen() {
            return None;
        }

        let mut queue = self.queue.lock();

        if !self.is_frozen() {
            return None;
        }

        let now = *self.virtual_now.read();
        Some(f(now, &mut queue))
    }

    /// Removes a queued event.
    ///
    /// Handles may be dropped or disposed inside a timer callback, on the thread that holds the
    /// queue during an advance. Such removals are deferred until the fire loop finishes; on any
    /// other thread this waits for the queue.
    pub fn unregister(&self, id: EventId) {
        {
            let mut firing = self.firing.lock();

            if firing.thread == Some(thread::current().id()) {
                firing.removals.push(id);
                return;
            }
        }

        self.queue.lock().remove(id);
    }

    /// Freezes the clock at `at`, or at the current real time.
    ///
    /// Freezing a frozen clock moves the virtual time to the new anchor.
    pub fn freeze(&self, at: Option<SystemTime>) {
        let _queue = self.queue.lock();

        let anchor = at.unwrap_or_else(SystemTime::now);
        *self.virtual_now.write() = anchor;
        let was_frozen = self.frozen.swap(true, Ordering::AcqRel);

        tracing::event!(
            name: "timewarp.clock.freeze",
            tracing::Level::DEBUG,
            clock.virtual_now = ?anchor,
            clock.was_frozen = was_frozen,
            "clock frozen",
        );
    }

    /// Hands every queued event over to real time and makes the clock live.
    ///
    /// Does nothing if the clock is live.
    pub fn thaw(&self) {
        let mut queue = self.queue.lock();

        if !self.is_frozen() {
            return;
        }

        let now = *self.virtual_now.read();
        let thawed = queue.len();

        for (_, event) in queue.drain() {
            event.thaw(now, self.runtime());
        }

        self.frozen.store(false, Ordering::Release);

        tracing::event!(
            name: "timewarp.clock.thaw",
            tracing::Level::DEBUG,
            clock.virtual_now = ?now,
            clock.thawed_events = thawed,
            "clock thawed",
        );
    }

    /// Moves the virtual time forward and fires every event that became due, in deadline order.
    ///
    /// A periodic timer whose next occurrence is also due fires again within the same call.
    pub fn advance(&self, by: Duration) -> Result<()> {
        let mut queue = self.queue.lock();

        if !self.is_frozen() {
            return Err(Error::from_kind(ErrorKind::NotFrozen));
        }

        let now = self
            .virtual_now
            .read()
            .checked_add(by)
            .ok_or_else(|| Error::from_kind(ErrorKind::TimeOverflow(by)))?;
        *self.virtual_now.write() = now;

        let mut fired = 0_usize;
        let firing = FiringGuard::enter(&self.firing);

        while let Some((id, event)) = queue.pop_due(now) {
            tracing::event!(
                name: "timewarp.clock.fire",
                tracing::Level::TRACE,
                event.id = id.get(),
                event.kind = event.kind(),
                "event fired",
            );

            fired += 1;

            if event.fire() {
                queue.insert(id, event.deadline(), event);
            }
        }

        for id in firing.take_removals() {
            queue.remove(id);
        }

        drop(firing);

        tracing::event!(
            name: "timewarp.clock.advance",
            tracing::Level::DEBUG,
            clock.advance_by = ?by,
            clock.virtual_now = ?now,
            clock.fired_events = fired,
            clock.pending_events = queue.len(),
            "clock advanced",
        );

        Ok(())
    }

    /// Claims the controller slot for `id`.
    pub fn claim(&self, id: u64) -> Result<()> {
        match self
            .controller
            .compare_exchange(NO_CONTROLLER, id, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                tracing::event!(
                    name: "timewarp.control.claim",
                    tracing::Level::DEBUG,
                    control.id = id,
                    "clock control claimed",
                );
                Ok(())
            }
            Err(_) => Err(Error::from_kind(ErrorKind::CompetingControllers)),
        }
    }

    /// Thaws the clock and frees the controller slot held by `id`.
    ///
    /// Fails without touching the clock if `id` does not hold the slot.
    pub fn release(&self, id: u64) -> Result<()> {
        if self.controller.load(Ordering::Acquire) != id {
            return Err(Error::from_kind(ErrorKind::NotActiveController));
        }

        self.thaw();

        match self
            .controller
            .compare_exchange(id, NO_CONTROLLER, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                tracing::event!(
                    name: "timewarp.control.release",
                    tracing::Level::DEBUG,
                    control.id = id,
                    "clock control released",
                );
                Ok(())
            }
            Err(_) => Err(Error::from_kind(ErrorKind::NotActiveController)),
        }
    }
}
