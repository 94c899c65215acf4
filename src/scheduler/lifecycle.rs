//! Task lifecycle: begin, wait, done-waiting, end, restart, readiness, and
//! the timers and loop guard that drive them.

use std::time::Duration;

use crate::error::SchedResult;
use crate::interrupt::InterruptType;
use crate::scheduler::{Completion, Scheduler};
use crate::task::{DoneWaiting, InvokeArgs, TaskId, TaskOutcome};
use crate::timer::TimerEvent;
use crate::trace::TraceEvent;

impl Scheduler {
    // -----------------------------------------------------------------------
    // Public, id-checked entry points
    // -----------------------------------------------------------------------

    /// Whether the task may be started now.
    pub fn is_task_ready(&self, id: TaskId) -> bool {
        let now = self.now();
        self.task(id).is_some_and(|t| t.is_ready_at(now))
    }

    /// Suspend a task. See [`TaskContext::wait`](crate::scheduler::TaskContext::wait).
    pub fn wait(
        &mut self,
        id: TaskId,
        max: Duration,
        while_waiting: Option<InterruptType>,
    ) -> SchedResult<()> {
        self.check_id(id)?;
        self.wait_unchecked(id, max, while_waiting);
        Ok(())
    }

    /// Leave the waiting state.
    pub fn done_waiting(&mut self, id: TaskId, return_to: InterruptType) -> SchedResult<DoneWaiting> {
        self.check_id(id)?;
        Ok(self.done_waiting_unchecked(id, return_to))
    }

    /// End a task and tear down its invocation chain.
    pub fn end_task(
        &mut self,
        id: TaskId,
        success: bool,
        next_begin_cooldown: Duration,
        was_interrupted: bool,
    ) -> SchedResult<()> {
        self.check_id(id)?;
        self.end_unchecked(id, success, next_begin_cooldown, was_interrupted);
        Ok(())
    }

    /// Re-enter `begin` with the task's current arguments, subject to the
    /// loop guard.
    pub fn restart_task(&mut self, id: TaskId) -> SchedResult<()> {
        self.check_id(id)?;
        self.restart_unchecked(id);
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Transitions
    // -----------------------------------------------------------------------

    pub(super) fn begin(&mut self, id: TaskId, args: InvokeArgs) {
        let now = self.now();
        let task = self.state_mut(id);

        // A penalty is spent once a begin honors it.
        if let (Some(penalty), Some(prev)) = (task.penalty_cooldown, task.time_begun) {
            if now.saturating_sub(prev) >= penalty {
                task.penalty_cooldown = None;
            }
        }

        task.active = true;
        task.waiting = false;
        task.time_begun = Some(now);
        task.next_begin_cooldown = None;
        task.args = args.clone();

        tracing::debug!(task = %task.kind, at = now.as_secs_f64(), "begin");
        let kind = task.kind.to_string();
        let event = TraceEvent::Began {
            agent: self.agent_name.clone(),
            task: kind,
            at_secs: now.as_secs_f64(),
        };
        self.emit(event);

        self.check_for_loop(id);
        self.with_behavior(id, "on_begin", |behavior, ctx| behavior.on_begin(ctx, &args));
    }

    pub(super) fn wait_unchecked(
        &mut self,
        id: TaskId,
        max: Duration,
        while_waiting: Option<InterruptType>,
    ) {
        if let Some(stale) = self.state_mut(id).wait_timer.take() {
            self.timers.cancel(stale);
        }
        // A zero or unrepresentably long limit means "until done_waiting".
        let due = if max.is_zero() {
            None
        } else {
            self.now().checked_add(max)
        };
        let timer = due.map(|due| self.timers.schedule(due, TimerEvent::WaitTimeout(id)));

        let task = self.state_mut(id);
        task.waiting = true;
        task.wait_timer = timer;
        task.interrupt_overridden = while_waiting.is_some();
        if let Some(interrupt) = while_waiting {
            task.interrupt_type = interrupt;
        }
        let kind = task.kind.to_string();
        let event = TraceEvent::Waiting {
            agent: self.agent_name.clone(),
            task: kind,
            max_secs: timer.map(|_| max.as_secs_f64()),
        };
        self.emit(event);
    }

    pub(super) fn done_waiting_unchecked(
        &mut self,
        id: TaskId,
        return_to: InterruptType,
    ) -> DoneWaiting {
        let task = self.state_mut(id);
        let preempted = !task.active;
        if task.waiting {
            let timer = task.wait_timer.take();
            task.waiting = false;
            if !preempted && task.interrupt_overridden {
                task.interrupt_type = return_to;
            }
            task.interrupt_overridden = false;
            if let Some(timer) = timer {
                self.timers.cancel(timer);
            }
        }
        if preempted {
            tracing::debug!(task = %self.state(id).kind, "ended while waiting");
            DoneWaiting::TaskEnded
        } else {
            DoneWaiting::Continue
        }
    }

    pub(super) fn end_unchecked(
        &mut self,
        id: TaskId,
        success: bool,
        next_begin_cooldown: Duration,
        was_interrupted: bool,
    ) {
        self.task_ended(id);

        let now = self.now();
        let task = self.state_mut(id);
        if !task.active && task.parent.is_none() && task.child.is_none() {
            return;
        }

        task.time_ended = Some(now);
        task.active = false;
        task.waiting = false;
        task.args = InvokeArgs::default();
        task.interrupt_type = task.default_interrupt_type;
        task.interrupt_overridden = false;
        task.next_begin_cooldown = (!next_begin_cooldown.is_zero()).then_some(next_begin_cooldown);
        task.guard.saved_interrupt = None;
        let timers = [task.wait_timer.take(), task.restart_timer.take()];
        for timer in timers.into_iter().flatten() {
            self.timers.cancel(timer);
        }
        // A completion meant for a lifecycle that just ended is stale.
        self.completions.retain(|c| c.parent != id);

        tracing::debug!(
            task = %self.state(id).kind,
            success,
            interrupted = was_interrupted,
            "end"
        );
        let event = TraceEvent::Ended {
            agent: self.agent_name.clone(),
            task: self.state(id).kind.to_string(),
            success,
            interrupted: was_interrupted,
            at_secs: now.as_secs_f64(),
        };
        self.emit(event);

        let outcome = TaskOutcome {
            success,
            interrupted: was_interrupted,
        };
        self.with_behavior(id, "on_end", |behavior, ctx| behavior.on_end(ctx, outcome));

        if let Some(parent) = self.state_mut(id).parent.take() {
            let p = self.state_mut(parent);
            p.waiting = false;
            if p.child == Some(id) {
                p.child = None;
            }
            if !was_interrupted {
                self.check_for_loop(parent);
                self.return_to_invoking_task(id, parent, success);
            }
        }

        // Parent first, then down the chain: the child is unlinked before it
        // ends so it does not hand control back to us.
        if let Some(child) = self.state_mut(id).child.take() {
            self.state_mut(child).parent = None;
            self.end_unchecked(child, false, Duration::ZERO, was_interrupted);
        }

        self.debug_check_links();
    }

    pub(super) fn restart_unchecked(&mut self, id: TaskId) {
        if !self.enabled {
            tracing::debug!(task = %self.state(id).kind, "scheduler inactive, restart ignored");
            return;
        }

        let penalized = self.state(id).guard.penalized;
        if !(penalized || self.check_for_loop(id)) {
            let args = self.state(id).args.clone();
            self.begin(id, args);
            return;
        }

        if self.is_task_ready(id) {
            tracing::debug!(task = %self.state(id).kind, "penalized restart ready");
            let task = self.state_mut(id);
            if let Some(saved) = task.guard.saved_interrupt.take() {
                task.interrupt_type = saved;
            }
            task.guard.penalized = false;
            let args = task.args.clone();
            self.begin(id, args);
            return;
        }

        let now = self.now();
        let task = self.state_mut(id);
        let delay = task.effective_cooldown();
        if task.guard.saved_interrupt.is_none() {
            task.guard.saved_interrupt = Some(task.interrupt_type);
        }
        task.interrupt_type = InterruptType::Never;
        let stale = task.restart_timer.take();
        if let Some(stale) = stale {
            self.timers.cancel(stale);
        }
        let timer = self
            .timers
            .schedule(now.saturating_add(delay), TimerEvent::Restart(id));
        self.state_mut(id).restart_timer = Some(timer);

        tracing::debug!(
            task = %self.state(id).kind,
            delay_secs = delay.as_secs_f64(),
            "penalized restart deferred"
        );
        let event = TraceEvent::RestartDeferred {
            agent: self.agent_name.clone(),
            task: self.state(id).kind.to_string(),
            delay_secs: delay.as_secs_f64(),
        };
        self.emit(event);
    }

    // -----------------------------------------------------------------------
    // Loop guard
    // -----------------------------------------------------------------------

    /// Count a start of `id`. On a trip, install the penalty cooldown on the
    /// task and every ancestor. Returns whether the guard tripped.
    pub(super) fn check_for_loop(&mut self, id: TaskId) -> bool {
        let now = self.now();
        let guard_config = &self.config.loop_guard;
        let penalty = guard_config.penalty_cooldown();
        let task = &mut self.slots[id.0].task;
        if !task.guard.record(now, guard_config) {
            return false;
        }
        task.guard.penalized = true;
        tracing::warn!(
            task = %task.kind,
            starts = task.guard.count(),
            cooldown_secs = penalty.as_secs_f64(),
            "task seems to be looping, adding a cooldown to it and its invokers"
        );

        let mut cursor = Some(id);
        let mut steps = 0;
        while let Some(current) = cursor {
            let t = self.state_mut(current);
            t.penalty_cooldown = Some(t.penalty_cooldown.unwrap_or(Duration::ZERO).max(penalty));
            cursor = t.parent;
            steps += 1;
            if steps > self.slots.len() {
                break;
            }
        }

        let event = TraceEvent::LoopPenalty {
            agent: self.agent_name.clone(),
            task: self.state(id).kind.to_string(),
            cooldown_secs: penalty.as_secs_f64(),
        };
        self.emit(event);
        true
    }

    // -----------------------------------------------------------------------
    // Timers and completions
    // -----------------------------------------------------------------------

    /// Fire every due timer whose handle is still the one its task holds.
    pub(super) fn fire_due_timers(&mut self) {
        let now = self.now();
        for (handle, event) in self.timers.take_due(now) {
            match event {
                TimerEvent::WaitTimeout(id) => {
                    if self.state(id).wait_timer != Some(handle) {
                        continue;
                    }
                    self.state_mut(id).wait_timer = None;
                    self.on_wait_timeout(id);
                }
                TimerEvent::Restart(id) => {
                    if self.state(id).restart_timer != Some(handle) {
                        continue;
                    }
                    self.state_mut(id).restart_timer = None;
                    self.restart_unchecked(id);
                }
            }
        }
    }

    fn on_wait_timeout(&mut self, id: TaskId) {
        let task = self.state_mut(id);
        task.waiting = false;
        task.interrupt_overridden = false;
        tracing::debug!(task = %task.kind, "wait timed out");
        let kind = task.kind.to_string();
        let event = TraceEvent::TimedOut {
            agent: self.agent_name.clone(),
            task: kind,
        };
        self.emit(event);
        self.force_interrupt_active_task(id);
    }

    /// Deliver the completions queued before this cycle started.
    pub(super) fn deliver_completions(&mut self) {
        let queued = self.completions.len();
        for _ in 0..queued {
            let Some(Completion {
                parent,
                child,
                success,
            }) = self.completions.pop_front()
            else {
                break;
            };
            tracing::debug!(
                task = %self.state(parent).kind,
                child = %self.state(child).kind,
                success,
                "invoked task completed"
            );
            self.with_behavior(parent, "on_invoked_task_completed", |behavior, ctx| {
                behavior.on_invoked_task_completed(ctx, success)
            });
        }
    }

    /// Whether `id` has a completion waiting to be delivered.
    pub(super) fn awaiting_completion(&self, id: TaskId) -> bool {
        self.completions.iter().any(|c| c.parent == id)
    }
}
