//! Cooperative timer scheduling.
//!
//! Nothing here runs on its own thread. The host calls
//! [`KinderEngine::tick`](crate::engine::KinderEngine::tick) with the current
//! time and the engine fires whatever is due. Handles are owned and not
//! `Clone`: whoever scheduled a timer is the only one able to cancel it.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    Poll,
    Countdown,
    Reminder,
    ReminderFlash,
}

/// Owned reference to a scheduled timer.
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TimerHandle {
    id: u64,
}

impl TimerHandle {
    pub fn matches(&self, fired: &FiredTimer) -> bool {
        self.id == fired.id
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FiredTimer {
    id: u64,
    pub kind: TimerKind,
    pub due: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct Scheduler {
    next_id: u64,
    queue: BTreeMap<(DateTime<Utc>, u64), TimerKind>,
    due_by_id: HashMap<u64, DateTime<Utc>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, at: DateTime<Utc>, kind: TimerKind) -> TimerHandle {
        self.next_id += 1;
        let id = self.next_id;
        self.queue.insert((at, id), kind);
        self.due_by_id.insert(id, at);
        TimerHandle { id }
    }

    /// Cancels a pending timer. Returns false if it already fired.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        match self.due_by_id.remove(&handle.id) {
            Some(at) => self.queue.remove(&(at, handle.id)).is_some(),
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        self.queue.clear();
        self.due_by_id.clear();
    }

    /// Removes and returns every timer due at `now`, earliest first.
    ///
    /// Timers scheduled while the caller handles the batch are left for the
    /// next call, so a handler that reschedules itself cannot spin.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<FiredTimer> {
        let due_keys: Vec<(DateTime<Utc>, u64)> = self
            .queue
            .range(..=(now, u64::MAX))
            .map(|(key, _)| *key)
            .collect();

        let mut fired = Vec::with_capacity(due_keys.len());
        for key in due_keys {
            if let Some(kind) = self.queue.remove(&key) {
                self.due_by_id.remove(&key.1);
                fired.push(FiredTimer {
                    id: key.1,
                    kind,
                    due: key.0,
                });
            }
        }
        fired
    }

    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.queue.keys().next().map(|(at, _)| *at)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}
