//! The per-agent task scheduler.
//!
//! The [`Scheduler`] owns every task of one agent in an arena indexed by
//! [`TaskId`]. Invocation links between tasks are plain ids, so the arena is
//! the only owner and links never keep anything alive. Each cycle the owning
//! agent calls [`Scheduler::update_active_tasks`], which:
//!
//! 1. delivers invoked-task completions queued by the previous cycle,
//! 2. fires due timers (wait timeouts, deferred restarts),
//! 3. re-drives a task that returned from `begin` without suspending,
//! 4. otherwise ranks primary tasks and continues, starts or preempts.
//!
//! All work happens on the caller's thread; there is no internal locking.

mod arbitration;
mod context;
mod events;
mod invocation;
mod lifecycle;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::agent::{AgentLink, MovementControl, NoMovement, TaskObserver};
use crate::clock::Clock;
use crate::config::{SchedulerConfig, TaskConfig};
use crate::error::{SchedResult, SchedulerError};
use crate::interrupt::InterruptType;
use crate::task::{Task, TaskBehavior, TaskId, TaskKind};
use crate::timer::TimerQueue;
use crate::trace::{NullSink, TraceEvent, TraceSink};

pub use context::TaskContext;

/// One registered task: scheduler state plus its behavior.
///
/// The behavior is `None` only while one of its hooks is executing.
struct TaskSlot {
    task: Task,
    behavior: Option<Box<dyn TaskBehavior>>,
}

/// An invoked task finished; its parent is told on the next cycle.
#[derive(Debug, Clone, Copy)]
struct Completion {
    parent: TaskId,
    child: TaskId,
    success: bool,
}

/// Arbitrates which of an agent's tasks controls it.
pub struct Scheduler {
    config: SchedulerConfig,
    clock: Arc<dyn Clock>,
    slots: Vec<TaskSlot>,
    by_kind: HashMap<TaskKind, TaskId>,
    primary: Vec<TaskId>,
    active: Option<TaskId>,
    reinvoke_active: bool,
    enabled: bool,
    initialized: bool,
    timers: TimerQueue,
    completions: VecDeque<Completion>,
    /// Kinds already warned about for returning from `begin` without suspending.
    warned_kinds: HashSet<TaskKind>,
    observers: Vec<Box<dyn TaskObserver>>,
    agent_name: String,
    movement: Box<dyn MovementControl>,
    sink: Arc<dyn TraceSink>,
}

impl Scheduler {
    /// Create an empty scheduler. Register tasks, then [`initialize`](Self::initialize).
    pub fn new(config: SchedulerConfig, clock: Arc<dyn Clock>) -> Self {
        let enabled = config.enabled;
        Self {
            config,
            clock,
            slots: Vec::new(),
            by_kind: HashMap::new(),
            primary: Vec::new(),
            active: None,
            reinvoke_active: false,
            enabled,
            initialized: false,
            timers: TimerQueue::new(),
            completions: VecDeque::new(),
            warned_kinds: HashSet::new(),
            observers: Vec::new(),
            agent_name: String::new(),
            movement: Box::new(NoMovement),
            sink: Arc::new(NullSink),
        }
    }

    /// Add a task. Registration order is the tie-break order for ranking.
    pub fn register(
        &mut self,
        config: TaskConfig,
        behavior: Box<dyn TaskBehavior>,
    ) -> SchedResult<TaskId> {
        if self.initialized {
            return Err(SchedulerError::AlreadyInitialized);
        }
        if config.kind.trim().is_empty() {
            return Err(SchedulerError::InvalidConfig {
                field: "kind".into(),
                message: "must not be empty".into(),
            });
        }
        let kind = TaskKind::new(config.kind.clone());
        if self.by_kind.contains_key(&kind) {
            return Err(SchedulerError::DuplicateTaskKind {
                kind: config.kind,
            });
        }
        let id = TaskId(self.slots.len());
        let task = Task::from_config(id, &config);
        if task.primary {
            self.primary.push(id);
        }
        tracing::debug!(task = %kind, %id, primary = task.primary, "registered task");
        self.by_kind.insert(kind, id);
        self.slots.push(TaskSlot {
            task,
            behavior: Some(behavior),
        });
        Ok(id)
    }

    /// Subscribe to "any task entered / exited" notifications.
    pub fn add_observer(&mut self, observer: Box<dyn TaskObserver>) {
        self.observers.push(observer);
    }

    /// Bind the scheduler to the agent it controls. The task set is fixed
    /// from here on.
    pub fn initialize(&mut self, link: AgentLink) -> SchedResult<()> {
        if self.initialized {
            return Err(SchedulerError::AlreadyInitialized);
        }
        self.agent_name = link.name;
        self.movement = link.movement;
        self.sink = link.sink;
        self.initialized = true;
        tracing::debug!(
            agent = %self.agent_name,
            tasks = self.slots.len(),
            primary = self.primary.len(),
            "scheduler initialized"
        );
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read access
    // -----------------------------------------------------------------------

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn agent_name(&self) -> &str {
        &self.agent_name
    }

    /// Current world time.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// The task currently controlling the agent.
    pub fn active_task(&self) -> Option<TaskId> {
        self.active
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.slots.get(id.0).map(|slot| &slot.task)
    }

    /// Task state by kind, without the missing-kind diagnostics of
    /// [`get_task_by_kind`](Self::get_task_by_kind).
    pub fn task_by_kind(&self, kind: &str) -> Option<&Task> {
        self.by_kind
            .get(&TaskKind::from(kind))
            .map(|id| &self.slots[id.0].task)
    }

    /// All tasks in registration order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.slots.iter().map(|slot| &slot.task)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of pending timers (wait timeouts and deferred restarts).
    pub fn pending_timers(&self) -> usize {
        self.timers.len()
    }

    /// Whether the re-drive flag is set for the next cycle.
    pub fn reinvoke_pending(&self) -> bool {
        self.reinvoke_active
    }

    /// Serializable view of the whole task set.
    pub fn snapshot(&self) -> SchedulerSnapshot {
        let kind_of = |id: Option<TaskId>| id.map(|id| self.slots[id.0].task.kind.to_string());
        SchedulerSnapshot {
            agent: self.agent_name.clone(),
            at_secs: self.now().as_secs_f64(),
            enabled: self.enabled,
            active: kind_of(self.active),
            tasks: self
                .slots
                .iter()
                .map(|slot| {
                    let t = &slot.task;
                    TaskSnapshot {
                        kind: t.kind.to_string(),
                        primary: t.primary,
                        enabled: t.enabled,
                        active: t.active,
                        waiting: t.waiting,
                        priority: t.priority,
                        interrupt: t.interrupt_type,
                        cooldown_secs: t.effective_cooldown().as_secs_f64(),
                        loop_penalized: t.guard.penalized,
                        parent: kind_of(t.parent),
                        child: kind_of(t.child),
                    }
                })
                .collect(),
        }
    }

    // -----------------------------------------------------------------------
    // Internals shared by the submodules
    // -----------------------------------------------------------------------

    fn check_id(&self, id: TaskId) -> SchedResult<()> {
        if id.0 < self.slots.len() {
            Ok(())
        } else {
            Err(SchedulerError::UnknownTask { id: id.0 })
        }
    }

    fn state(&self, id: TaskId) -> &Task {
        &self.slots[id.0].task
    }

    fn state_mut(&mut self, id: TaskId) -> &mut Task {
        &mut self.slots[id.0].task
    }

    fn emit(&self, event: TraceEvent) {
        self.sink.emit(&event);
    }

    /// Run one hook of `id`'s behavior with a context bound to that task.
    ///
    /// Returns `None` without calling anything when a hook of the same task
    /// is already on the stack.
    fn with_behavior<R>(
        &mut self,
        id: TaskId,
        hook: &'static str,
        f: impl FnOnce(&mut dyn TaskBehavior, &mut TaskContext<'_>) -> R,
    ) -> Option<R> {
        let Some(mut behavior) = self.slots[id.0].behavior.take() else {
            tracing::debug!(
                task = %self.slots[id.0].task.kind,
                hook,
                "hook re-entered on a running task, skipping"
            );
            return None;
        };
        let result = {
            let mut ctx = TaskContext::new(self, id);
            f(behavior.as_mut(), &mut ctx)
        };
        self.slots[id.0].behavior = Some(behavior);
        Some(result)
    }

    /// Ask a task's behavior for its score. Keeps the previous score when the
    /// behavior is busy.
    fn calculate_priority(&mut self, id: TaskId) -> f32 {
        let slot = &mut self.slots[id.0];
        match slot.behavior.as_mut() {
            Some(behavior) => behavior.calculate_priority(&slot.task),
            None => slot.task.priority,
        }
    }

    fn notify_entered(&mut self, id: TaskId) {
        let kind = self.slots[id.0].task.kind.to_string();
        for observer in &mut self.observers {
            observer.on_task_entered(&self.agent_name, &kind);
        }
    }

    fn notify_exited(&mut self, id: TaskId) {
        let kind = self.slots[id.0].task.kind.to_string();
        for observer in &mut self.observers {
            observer.on_task_exited(&self.agent_name, &kind);
        }
    }

    /// Assert link consistency in debug builds.
    fn debug_check_links(&self) {
        if cfg!(debug_assertions) {
            if let Err(e) = self.check_invocation_links() {
                panic!("{e}");
            }
        }
    }

    /// Change a task's current interrupt type. Reset to the default when the
    /// task ends.
    pub fn set_interrupt_type(&mut self, id: TaskId, interrupt: InterruptType) -> SchedResult<()> {
        self.check_id(id)?;
        self.state_mut(id).interrupt_type = interrupt;
        Ok(())
    }

    /// Enable or disable a task for ranking and perception fan-out.
    pub fn set_task_enabled(&mut self, id: TaskId, enabled: bool) -> SchedResult<()> {
        self.check_id(id)?;
        self.state_mut(id).enabled = enabled;
        Ok(())
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("agent", &self.agent_name)
            .field("tasks", &self.slots.len())
            .field("active", &self.active)
            .field("enabled", &self.enabled)
            .field("initialized", &self.initialized)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Point-in-time view of a scheduler, for display and tests.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerSnapshot {
    pub agent: String,
    pub at_secs: f64,
    pub enabled: bool,
    pub active: Option<String>,
    pub tasks: Vec<TaskSnapshot>,
}

/// Point-in-time view of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub kind: String,
    pub primary: bool,
    pub enabled: bool,
    pub active: bool,
    pub waiting: bool,
    pub priority: f32,
    pub interrupt: InterruptType,
    pub cooldown_secs: f64,
    pub loop_penalized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub child: Option<String>,
}
