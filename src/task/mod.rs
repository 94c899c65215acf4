//! Tasks: units of behavior competing for control of an agent.
//!
//! A task is split in two halves. [`Task`] is the bookkeeping the scheduler
//! owns (lifecycle flags, cooldowns, interrupt policy, invocation links, loop
//! guard). [`TaskBehavior`] is the user-supplied logic: it scores the task and
//! reacts to lifecycle hooks through a [`TaskContext`](crate::scheduler::TaskContext).

mod args;
mod behavior;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TaskConfig;
use crate::interrupt::InterruptType;
use crate::loop_guard::LoopGuard;
use crate::timer::TimerHandle;

pub use args::InvokeArgs;
pub use behavior::TaskBehavior;

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Index of a task within the scheduler that registered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub(crate) usize);

impl TaskId {
    /// Position in registration order.
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable kind identifier. An agent holds at most one task per kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskKind(String);

impl TaskKind {
    pub fn new(kind: impl Into<String>) -> Self {
        Self(kind.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskKind {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TaskKind {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Application-defined trigger tag delivered through
/// [`Scheduler::on_custom_trigger`](crate::scheduler::Scheduler::on_custom_trigger).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TriggerId(pub String);

impl TriggerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// How a task ended, as reported to its `on_end` hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOutcome {
    pub success: bool,
    /// Ended because a better candidate preempted it (or its ancestor).
    pub interrupted: bool,
}

/// Result of [`TaskContext::done_waiting`](crate::scheduler::TaskContext::done_waiting).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoneWaiting {
    /// The task is still active; resume its logic.
    Continue,
    /// The task was ended while it waited; do not resume.
    TaskEnded,
}

// ---------------------------------------------------------------------------
// Task state
// ---------------------------------------------------------------------------

/// Scheduler-owned state of one task.
#[derive(Debug, Clone)]
pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) kind: TaskKind,
    pub(crate) primary: bool,
    pub(crate) enabled: bool,
    pub(crate) priority: f32,
    pub(crate) cooldown: Duration,
    pub(crate) interrupt_type: InterruptType,
    pub(crate) default_interrupt_type: InterruptType,
    pub(crate) interrupt_overridden: bool,
    pub(crate) active: bool,
    pub(crate) waiting: bool,
    pub(crate) parent: Option<TaskId>,
    pub(crate) child: Option<TaskId>,
    pub(crate) time_begun: Option<Duration>,
    pub(crate) time_ended: Option<Duration>,
    /// One-shot cooldown override for the next readiness check.
    pub(crate) next_begin_cooldown: Option<Duration>,
    /// Cooldown installed by the loop guard, on top of `cooldown`.
    pub(crate) penalty_cooldown: Option<Duration>,
    pub(crate) args: InvokeArgs,
    pub(crate) guard: LoopGuard,
    pub(crate) wait_timer: Option<TimerHandle>,
    pub(crate) restart_timer: Option<TimerHandle>,
}

impl Task {
    pub(crate) fn from_config(id: TaskId, config: &TaskConfig) -> Self {
        Self {
            id,
            kind: TaskKind::new(config.kind.clone()),
            primary: config.primary,
            enabled: config.enabled,
            priority: 0.0,
            cooldown: config.cooldown(),
            interrupt_type: config.interrupt,
            default_interrupt_type: config.interrupt,
            interrupt_overridden: false,
            active: false,
            waiting: false,
            parent: None,
            child: None,
            time_begun: None,
            time_ended: None,
            next_begin_cooldown: None,
            penalty_cooldown: None,
            args: InvokeArgs::default(),
            guard: LoopGuard::default(),
            wait_timer: None,
            restart_timer: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Last computed score. Use
    /// [`Scheduler::get_priority`](crate::scheduler::Scheduler::get_priority)
    /// for the value used in interruption decisions.
    pub fn priority(&self) -> f32 {
        self.priority
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    pub fn interrupt_type(&self) -> InterruptType {
        self.interrupt_type
    }

    pub fn default_interrupt_type(&self) -> InterruptType {
        self.default_interrupt_type
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_waiting(&self) -> bool {
        self.waiting
    }

    /// Who invoked this task, if anyone.
    pub fn parent(&self) -> Option<TaskId> {
        self.parent
    }

    /// The task this one delegated to, if any.
    pub fn child(&self) -> Option<TaskId> {
        self.child
    }

    pub fn time_begun(&self) -> Option<Duration> {
        self.time_begun
    }

    pub fn time_ended(&self) -> Option<Duration> {
        self.time_ended
    }

    pub fn next_begin_cooldown(&self) -> Option<Duration> {
        self.next_begin_cooldown
    }

    pub fn penalty_cooldown(&self) -> Option<Duration> {
        self.penalty_cooldown
    }

    /// Whether the loop guard has flagged this task and the penalty has not
    /// been consumed by a restart yet.
    pub fn is_loop_penalized(&self) -> bool {
        self.guard.penalized
    }

    /// Arguments of the current (or last deferred) invocation.
    pub fn args(&self) -> &InvokeArgs {
        &self.args
    }

    /// Base cooldown raised to any loop-guard penalty.
    pub fn effective_cooldown(&self) -> Duration {
        self.cooldown.max(self.penalty_cooldown.unwrap_or(Duration::ZERO))
    }

    /// Cooldown the next readiness check must honor: the one-shot override if
    /// set, else the base cooldown, never below the loop-guard penalty.
    pub fn required_cooldown(&self) -> Duration {
        self.next_begin_cooldown
            .unwrap_or(self.cooldown)
            .max(self.penalty_cooldown.unwrap_or(Duration::ZERO))
    }

    /// Readiness at world time `now`.
    pub fn is_ready_at(&self, now: Duration) -> bool {
        let Some(begun) = self.time_begun else {
            return true;
        };
        let required = self.required_cooldown();
        required.is_zero() || now.saturating_sub(begun) >= required
    }
}
