//! Structured agent trace ("thoughts").
//!
//! The scheduler reports lifecycle transitions as typed [`TraceEvent`]s
//! instead of formatted strings. A [`TraceSink`] is handed to the scheduler at
//! initialization and decides how to render them: plain text lines, NDJSON,
//! a bounded in-memory [`ThoughtLog`], or nothing at all.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

// ── Event types ─────────────────────────────────────────────────────────

/// A structured trace entry emitted by the scheduler or a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TraceEvent {
    /// A task entered `begin`.
    Began { agent: String, task: String, at_secs: f64 },
    /// A task ended.
    Ended {
        agent: String,
        task: String,
        success: bool,
        interrupted: bool,
        at_secs: f64,
    },
    /// A task delegated to another.
    Invoked {
        agent: String,
        parent: String,
        child: String,
    },
    /// The active task was preempted by a better candidate.
    Preempted {
        agent: String,
        active: String,
        candidate: String,
        active_priority: f32,
        candidate_priority: f32,
    },
    /// A task suspended itself.
    Waiting {
        agent: String,
        task: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_secs: Option<f64>,
    },
    /// A wait exceeded its maximum duration.
    TimedOut { agent: String, task: String },
    /// The loop guard throttled a runaway task.
    LoopPenalty {
        agent: String,
        task: String,
        cooldown_secs: f64,
    },
    /// A penalized restart was postponed.
    RestartDeferred {
        agent: String,
        task: String,
        delay_secs: f64,
    },
    /// Free-form note from a task's own logic.
    Thought {
        agent: String,
        task: String,
        text: String,
    },
}

impl TraceEvent {
    /// Kind name of the task this entry concerns, when there is exactly one.
    pub fn task(&self) -> Option<&str> {
        match self {
            Self::Began { task, .. }
            | Self::Ended { task, .. }
            | Self::Waiting { task, .. }
            | Self::TimedOut { task, .. }
            | Self::LoopPenalty { task, .. }
            | Self::RestartDeferred { task, .. }
            | Self::Thought { task, .. } => Some(task),
            Self::Invoked { .. } | Self::Preempted { .. } => None,
        }
    }

    /// One-line human-readable rendering.
    pub fn render(&self) -> String {
        match self {
            Self::Began { agent, task, at_secs } => {
                format!("[{agent}] {at_secs:>8.3}s  begin {task}")
            }
            Self::Ended {
                agent,
                task,
                success,
                interrupted,
                at_secs,
            } => {
                let how = match (success, interrupted) {
                    (_, true) => "interrupted",
                    (true, false) => "ok",
                    (false, false) => "failed",
                };
                format!("[{agent}] {at_secs:>8.3}s  end {task} ({how})")
            }
            Self::Invoked {
                agent,
                parent,
                child,
            } => format!("[{agent}] {parent} invokes {child}"),
            Self::Preempted {
                agent,
                active,
                candidate,
                active_priority,
                candidate_priority,
            } => format!(
                "[{agent}] {candidate} ({candidate_priority:.1}) preempts {active} ({active_priority:.1})"
            ),
            Self::Waiting {
                agent,
                task,
                max_secs,
            } => match max_secs {
                Some(s) => format!("[{agent}] {task} waits (max {s:.2}s)"),
                None => format!("[{agent}] {task} waits"),
            },
            Self::TimedOut { agent, task } => format!("[{agent}] {task} timed out"),
            Self::LoopPenalty {
                agent,
                task,
                cooldown_secs,
            } => format!("[{agent}] {task} is looping, cooldown {cooldown_secs:.2}s"),
            Self::RestartDeferred {
                agent,
                task,
                delay_secs,
            } => format!("[{agent}] {task} restart deferred {delay_secs:.2}s"),
            Self::Thought { agent, task, text } => format!("[{agent}] {task}: {text}"),
        }
    }
}

// ── TraceSink trait ─────────────────────────────────────────────────────

/// A destination for trace events.
pub trait TraceSink: Send + Sync {
    fn emit(&self, event: &TraceEvent);
}

// ── Sinks ───────────────────────────────────────────────────────────────

/// Prints each event on its own line.
pub struct StdoutSink;

impl TraceSink for StdoutSink {
    fn emit(&self, event: &TraceEvent) {
        println!("{}", event.render());
    }
}

/// Emits events as newline-delimited JSON.
pub struct JsonSink;

impl TraceSink for JsonSink {
    fn emit(&self, event: &TraceEvent) {
        if let Ok(json) = serde_json::to_string(event) {
            println!("{json}");
        }
    }
}

/// Discards everything.
pub struct NullSink;

impl TraceSink for NullSink {
    fn emit(&self, _event: &TraceEvent) {}
}

/// Bounded memory of the most recent events; the oldest are dropped first.
pub struct ThoughtLog {
    capacity: usize,
    entries: Mutex<VecDeque<TraceEvent>>,
}

impl ThoughtLog {
    /// Default number of retained entries.
    pub const DEFAULT_CAPACITY: usize = 30;

    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Snapshot of the retained entries, oldest first.
    pub fn entries(&self) -> Vec<TraceEvent> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<TraceEvent>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for ThoughtLog {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

impl TraceSink for ThoughtLog {
    fn emit(&self, event: &TraceEvent) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.lock();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(event.clone());
    }
}

/// Forwards every event to several sinks in order.
pub struct FanoutSink {
    sinks: Vec<std::sync::Arc<dyn TraceSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<std::sync::Arc<dyn TraceSink>>) -> Self {
        Self { sinks }
    }
}

impl TraceSink for FanoutSink {
    fn emit(&self, event: &TraceEvent) {
        for sink in &self.sinks {
            sink.emit(event);
        }
    }
}
