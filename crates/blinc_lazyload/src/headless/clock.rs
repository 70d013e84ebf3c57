//! Manual clock and timer queue

use std::time::Duration;

use slotmap::SlotMap;

use crate::environment::{TimerCallback, TimerId};

struct PendingTimer {
    deadline: Duration,
    /// Registration order, breaks deadline ties
    seq: u64,
    callback: TimerCallback,
}

/// Timers keyed by deadline, fired explicitly by the owner
#[derive(Default)]
pub struct TimerQueue {
    timers: SlotMap<TimerId, PendingTimer>,
    next_seq: u64,
}

impl std::fmt::Debug for TimerQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerQueue")
            .field("pending", &self.timers.len())
            .finish()
    }
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule(&mut self, deadline: Duration, callback: TimerCallback) -> TimerId {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.timers.insert(PendingTimer {
            deadline,
            seq,
            callback,
        })
    }

    /// Returns whether the timer was still pending
    pub fn cancel(&mut self, id: TimerId) -> bool {
        self.timers.remove(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    pub fn is_pending(&self, id: TimerId) -> bool {
        self.timers.contains_key(id)
    }

    /// Deadline of the earliest pending timer
    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.values().map(|t| t.deadline).min()
    }

    /// Remove and return the earliest timer due at or before `until`
    pub fn pop_due(&mut self, until: Duration) -> Option<(Duration, TimerCallback)> {
        let id = self
            .timers
            .iter()
            .filter(|(_, t)| t.deadline <= until)
            .min_by_key(|(_, t)| (t.deadline, t.seq))
            .map(|(id, _)| id)?;
        self.timers
            .remove(id)
            .map(|timer| (timer.deadline, timer.callback))
    }
}
