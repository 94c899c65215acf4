//! Routing of external events to task hooks.

use crate::error::SchedResult;
use crate::perception::{EntityRef, Stimulus};
use crate::scheduler::Scheduler;
use crate::task::{TaskId, TriggerId};

impl Scheduler {
    /// Forward a perception event to every enabled task.
    pub fn on_sensory_event(&mut self, source: EntityRef, stimulus: &Stimulus) {
        for index in 0..self.slots.len() {
            let id = TaskId(index);
            if !self.state(id).enabled {
                continue;
            }
            self.with_behavior(id, "on_perception", |behavior, ctx| {
                behavior.on_perception(ctx, source, stimulus)
            });
        }
    }

    /// Deliver an application trigger to the task registered as `kind`, or
    /// to every task when `kind` is `None`.
    ///
    /// An unknown kind is logged and reported; nothing is delivered.
    pub fn on_custom_trigger(
        &mut self,
        kind: Option<&str>,
        trigger: &TriggerId,
        payload: Option<&serde_json::Value>,
    ) -> SchedResult<()> {
        let targets = match kind {
            Some(kind) => vec![self.get_task_by_kind(kind)?],
            None => (0..self.slots.len()).map(TaskId).collect(),
        };
        for id in targets {
            self.with_behavior(id, "on_custom_trigger", |behavior, ctx| {
                behavior.on_custom_trigger(ctx, trigger, payload)
            });
        }
        Ok(())
    }

    /// Globally enable or disable evaluation. Disabling leaves the active
    /// task running but blocks new starts and restarts.
    pub fn set_scheduler_active(&mut self, active: bool) {
        if self.enabled != active {
            tracing::debug!(agent = %self.agent_name, active, "scheduler toggled");
        }
        self.enabled = active;
    }

    pub fn is_scheduler_active(&self) -> bool {
        self.enabled
    }
}
