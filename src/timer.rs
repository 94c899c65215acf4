//! Single-shot delayed callbacks keyed by cancellable handles.
//!
//! Timers are plain data: the queue only stores `(deadline, event)` pairs and
//! hands due events back to the scheduler, which dispatches them on the
//! agent's own update cadence. A task remembers the handle of each timer it
//! owns and ignores any firing whose handle it no longer holds, so a timer
//! superseded by a state transition can never act on a later lifecycle.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::task::TaskId;

/// What a timer does when it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    /// The task's `wait` exceeded its maximum duration.
    WaitTimeout(TaskId),
    /// A loop-penalized restart that was deferred until its cooldown elapsed.
    Restart(TaskId),
}

/// Handle to a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle {
    due: Duration,
    seq: u64,
}

impl TimerHandle {
    /// Deadline of this timer in world time.
    pub fn due(&self) -> Duration {
        self.due
    }
}

/// Ordered queue of pending single-shot timers.
#[derive(Debug, Default)]
pub struct TimerQueue {
    pending: BTreeMap<TimerHandle, TimerEvent>,
    next_seq: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `event` to fire at world time `due`.
    pub fn schedule(&mut self, due: Duration, event: TimerEvent) -> TimerHandle {
        let handle = TimerHandle {
            due,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.pending.insert(handle, event);
        handle
    }

    /// Cancel a pending timer. Returns whether it was still pending.
    pub fn cancel(&mut self, handle: TimerHandle) -> bool {
        self.pending.remove(&handle).is_some()
    }

    /// Whether the timer is still pending.
    pub fn is_pending(&self, handle: TimerHandle) -> bool {
        self.pending.contains_key(&handle)
    }

    /// Remove and return every timer due at or before `now`, in deadline
    /// order (ties in scheduling order).
    pub fn take_due(&mut self, now: Duration) -> Vec<(TimerHandle, TimerEvent)> {
        let mut due = Vec::new();
        while let Some(entry) = self.pending.first_entry() {
            if entry.key().due > now {
                break;
            }
            let handle = *entry.key();
            let event = entry.remove();
            due.push((handle, event));
        }
        due
    }

    /// Number of pending timers.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
