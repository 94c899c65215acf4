//! Per-cycle ranking and the start / continue / preempt decision.

use std::time::Duration;

use crate::error::{SchedResult, SchedulerError};
use crate::scheduler::Scheduler;
use crate::task::{InvokeArgs, TaskId};
use crate::trace::TraceEvent;

impl Scheduler {
    /// Run one evaluation cycle.
    ///
    /// No-op while the scheduler is inactive or not initialized.
    pub fn update_active_tasks(&mut self) {
        if !self.enabled || !self.initialized {
            return;
        }

        // Completions first: one queued by a timer firing below waits a cycle.
        self.deliver_completions();
        self.fire_due_timers();

        if self.reinvoke_active {
            self.reinvoke_active = false;
            if let Some(active) = self.active {
                tracing::debug!(task = %self.state(active).kind, "re-driving active task");
                let args = self.state(active).args.clone();
                self.start_unchecked(active, args);
                return;
            }
        }

        let Some(candidate) = self.select_candidate() else {
            return;
        };

        let Some(active) = self.active else {
            self.start_unchecked(candidate, InvokeArgs::default());
            return;
        };

        // The active task is (or descends from) the candidate, or the other
        // way round: the chain is already running.
        if active != candidate
            && (self.is_ancestor_of_unchecked(candidate, active)
                || self.is_ancestor_of_unchecked(active, candidate))
        {
            return;
        }

        if active == candidate {
            if !self.state(active).active {
                tracing::warn!(
                    task = %self.state(active).kind,
                    "active task was not active, waking it up"
                );
                let args = self.state(active).args.clone();
                self.start_unchecked(active, args);
            }
            return;
        }

        if !self.state(active).active {
            self.start_unchecked(candidate, InvokeArgs::default());
            return;
        }

        let active_priority = self.get_priority_unchecked(active);
        let candidate_priority = self.get_priority_unchecked(candidate);
        let interrupt = self.state(active).interrupt_type;
        if !self
            .config
            .margins
            .should_interrupt(interrupt, active_priority, candidate_priority)
        {
            return;
        }

        tracing::debug!(
            active = %self.state(active).kind,
            candidate = %self.state(candidate).kind,
            active_priority,
            candidate_priority,
            %interrupt,
            "preempting active task"
        );
        let event = TraceEvent::Preempted {
            agent: self.agent_name.clone(),
            active: self.state(active).kind.to_string(),
            candidate: self.state(candidate).kind.to_string(),
            active_priority,
            candidate_priority,
        };
        self.emit(event);

        let root = self.oldest_invoking_ancestor_unchecked(active).unwrap_or(active);
        self.end_unchecked(root, false, Duration::ZERO, true);
        self.movement.stop_movement();
        self.notify_exited(active);
        self.start_unchecked(candidate, InvokeArgs::default());
    }

    /// Score every enabled primary task and return the best ready one.
    ///
    /// Only a score strictly above the current best replaces it, so the
    /// first task (in registration order) reaching the maximum wins, and
    /// nothing at or below the selection floor is ever chosen.
    fn select_candidate(&mut self) -> Option<TaskId> {
        let mut best = None;
        let mut best_score = self.config.selection_floor;
        for index in 0..self.primary.len() {
            let id = self.primary[index];
            if !self.state(id).enabled {
                continue;
            }
            let score = self.calculate_priority(id);
            self.state_mut(id).priority = score;
            if self.is_task_ready(id) && score > best_score {
                best_score = score;
                best = Some(id);
            }
        }
        best
    }

    /// Make `id` the active task and begin it, bypassing ranking.
    pub fn start(&mut self, id: TaskId, args: InvokeArgs) -> SchedResult<()> {
        if !self.initialized {
            return Err(SchedulerError::NotInitialized);
        }
        self.check_id(id)?;
        self.start_unchecked(id, args);
        Ok(())
    }

    pub(super) fn start_unchecked(&mut self, id: TaskId, args: InvokeArgs) {
        self.active = Some(id);
        self.begin(id, args);

        let task = self.state(id);
        let stuck = task.active
            && !task.waiting
            && task.effective_cooldown().is_zero()
            && !self.awaiting_completion(id);
        if stuck {
            let kind = task.kind.clone();
            if self.warned_kinds.insert(kind.clone()) {
                tracing::warn!(
                    task = %kind,
                    "task returned from begin without ending or waiting; did it forget to end?"
                );
            }
            self.reinvoke_active = true;
        }

        self.notify_entered(id);
    }

    /// End `assumed` if it is still the active task. A stale assumption is
    /// ignored.
    pub fn force_interrupt_active_task(&mut self, assumed: TaskId) {
        if self.active != Some(assumed) {
            return;
        }
        self.end_unchecked(assumed, false, Duration::ZERO, false);
        self.notify_exited(assumed);
        // Ending may already have handed control back to an invoking parent.
        if self.active == Some(assumed) {
            self.active = None;
        }
    }
}
