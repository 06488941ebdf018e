// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::{BTreeMap, HashMap};
use std::mem;
use std::time::SystemTime;

use crate::Interval;

/// The point in virtual time at which a queued event becomes due.
///
/// `Never` orders after every concrete point in time, so such events are never detached by
/// [`EventQueue::pop_due`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum Deadline {
    At(SystemTime),
    Never,
}

impl Deadline {
    /// The deadline `interval` after `now`.
    ///
    /// Deadlines past the end of the `SystemTime` range never elapse.
    pub fn after(now: SystemTime, interval: Interval) -> Self {
        interval
            .to_duration()
            .and_then(|duration| now.checked_add(duration))
            .map_or(Self::Never, Self::At)
    }
}

/// Identity of an event tracked by the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct EventId(u64);

impl EventId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    deadline: Deadline,

    /// Orders events with the same deadline by insertion.
    discriminator: u64,
}

/// Pending events sorted by deadline, first-in first-out among equal deadlines.
///
/// Each event is tracked under its [`EventId`]; an id is present at most once.
#[derive(Debug)]
pub(crate) struct EventQueue<T> {
    entries: BTreeMap<QueueKey, (EventId, T)>,
    positions: HashMap<EventId, QueueKey>,
    last_discriminator: u64,
}

impl<T> Default for EventQueue<T> {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            positions: HashMap::new(),
            last_discriminator: 0,
        }
    }
}

impl<T> EventQueue<T> {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub fn contains(&self, id: EventId) -> bool {
        self.positions.contains_key(&id)
    }

    /// Inserts an event after every queued event with a deadline at or before `deadline`.
    ///
    /// An event already queued under `id` is replaced.
    pub fn insert(&mut self, id: EventId, deadline: Deadline, event: T) {
        self.remove(id);

        self.last_discriminator = self.last_discriminator.wrapping_add(1);
        let key = QueueKey {
            deadline,
            discriminator: self.last_discriminator,
        };

        self.entries.insert(key, (id, event));
        self.positions.insert(id, key);
    }

    /// Removes the event queued under `id`, if any.
    pub fn remove(&mut self, id: EventId) -> Option<T> {
        let key = self.positions.remove(&id)?;
        self.entries.remove(&key).map(|(_, event)| event)
    }

    /// Returns the earliest deadline, or `None` if the queue is empty.
    #[cfg(test)]
    pub fn next_deadline(&self) -> Option<Deadline> {
        self.entries.keys().next().map(|key| key.deadline)
    }

    /// Detaches the earliest event if it is due at or before `now`.
    ///
    /// Calling this until it returns `None` detaches every due event in ascending order.
    pub fn pop_due(&mut self, now: SystemTime) -> Option<(EventId, T)> {
        let entry = self.entries.first_entry()?;

        if entry.key().deadline > Deadline::At(now) {
            return None;
        }

        let (id, event) = entry.remove();
        self.positions.remove(&id);
        Some((id, event))
    }

    /// Detaches every event in ascending deadline order.
    pub fn drain(&mut self) -> impl Iterator<Item = (EventId, T)> + use<T> {
        self.positions.clear();
        mem::take(&mut self.entries).into_values()
    }
}
