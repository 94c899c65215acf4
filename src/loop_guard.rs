//! Runaway-restart detection.
//!
//! Each task counts its starts inside a rolling window. A task that starts
//! `max_starts` times before the window closes is flagged; the scheduler then
//! installs a penalty cooldown on it and on every ancestor in its invocation
//! chain.

use std::time::Duration;

use crate::config::LoopGuardConfig;
use crate::interrupt::InterruptType;

/// Per-task loop-guard state.
#[derive(Debug, Clone, Default)]
pub struct LoopGuard {
    window_start: Option<Duration>,
    count: u32,
    pub(crate) penalized: bool,
    /// Interrupt type to restore once a deferred restart goes through.
    pub(crate) saved_interrupt: Option<InterruptType>,
}

impl LoopGuard {
    /// Record one start at `now`. Returns `true` when the guard trips.
    ///
    /// A start outside the current window (strictly later than its width)
    /// opens a new window and counts as its first start, so the guard trips
    /// on the `max_starts`-th start, one earlier than a counter reset to zero
    /// would. The count is not reset on a trip, so every further start inside
    /// the same window trips again.
    pub fn record(&mut self, now: Duration, config: &LoopGuardConfig) -> bool {
        match self.window_start {
            Some(start) if now.saturating_sub(start) <= config.window() => {
                self.count = self.count.saturating_add(1);
            }
            _ => {
                self.window_start = Some(now);
                self.count = 1;
            }
        }
        self.count >= config.max_starts
    }

    /// Starts counted in the current window.
    pub fn count(&self) -> u32 {
        self.count
    }

    pub fn window_start(&self) -> Option<Duration> {
        self.window_start
    }
}
