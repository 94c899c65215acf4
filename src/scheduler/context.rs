use std::time::Duration;

use crate::error::SchedResult;
use crate::interrupt::InterruptType;
use crate::scheduler::Scheduler;
use crate::task::{DoneWaiting, InvokeArgs, Task, TaskId, TaskKind};
use crate::trace::TraceEvent;

/// A task's handle on its scheduler while one of its hooks runs.
///
/// Operations act on the task the hook belongs to; the rest of the scheduler
/// is readable through [`scheduler`](Self::scheduler).
pub struct TaskContext<'a> {
    scheduler: &'a mut Scheduler,
    id: TaskId,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(scheduler: &'a mut Scheduler, id: TaskId) -> Self {
        Self { scheduler, id }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    /// This task's state.
    pub fn task(&self) -> &Task {
        self.scheduler.state(self.id)
    }

    pub fn kind(&self) -> &TaskKind {
        &self.task().kind
    }

    pub fn scheduler(&self) -> &Scheduler {
        &*self.scheduler
    }

    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// Priority used for interruption decisions (inherited when invoked).
    pub fn priority(&self) -> f32 {
        self.scheduler.get_priority_unchecked(self.id)
    }

    /// Suspend. A non-zero `max` force-interrupts the task if it is still
    /// waiting when the time runs out. `while_waiting` temporarily replaces
    /// the interrupt type.
    pub fn wait(&mut self, max: Duration, while_waiting: Option<InterruptType>) {
        self.scheduler.wait_unchecked(self.id, max, while_waiting);
    }

    /// Leave the waiting state. `TaskEnded` means the task was ended while it
    /// waited and must not resume.
    pub fn done_waiting(&mut self, return_to: InterruptType) -> DoneWaiting {
        self.scheduler.done_waiting_unchecked(self.id, return_to)
    }

    pub fn end(&mut self, success: bool) {
        self.scheduler
            .end_unchecked(self.id, success, Duration::ZERO, false);
    }

    /// End and require `next_begin_cooldown` before the next start, instead of
    /// the configured cooldown.
    pub fn end_with_cooldown(&mut self, success: bool, next_begin_cooldown: Duration) {
        self.scheduler
            .end_unchecked(self.id, success, next_begin_cooldown, false);
    }

    /// Re-enter `begin` with the current arguments, subject to the loop guard.
    pub fn restart(&mut self) {
        self.scheduler.restart_unchecked(self.id);
    }

    /// Delegate to the task registered as `kind`. This task waits until the
    /// child finishes.
    pub fn invoke(&mut self, kind: &str, args: InvokeArgs) -> SchedResult<TaskId> {
        self.scheduler.invoke(kind, self.id, args)
    }

    pub fn set_interrupt_type(&mut self, interrupt: InterruptType) {
        self.scheduler.state_mut(self.id).interrupt_type = interrupt;
    }

    /// Record a free-form thought in the agent's trace.
    pub fn trace(&mut self, text: impl Into<String>) {
        let event = TraceEvent::Thought {
            agent: self.scheduler.agent_name.clone(),
            task: self.task().kind.to_string(),
            text: text.into(),
        };
        self.scheduler.emit(event);
    }
}
