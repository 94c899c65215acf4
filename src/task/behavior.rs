use crate::perception::{EntityRef, Stimulus};
use crate::scheduler::TaskContext;
use crate::task::{InvokeArgs, Task, TaskOutcome, TriggerId};

/// User-supplied logic of one task.
///
/// Hooks run synchronously on the agent's update cadence. A task suspends
/// only by calling [`TaskContext::wait`] (or by invoking a child, which waits
/// on its behalf); returning from [`on_begin`](Self::on_begin) without waiting,
/// ending, or a cooldown makes the scheduler re-drive the task next cycle.
///
/// While one of a task's hooks is running, further hooks for that same task
/// are skipped. In particular, a task that ends itself from inside a hook does
/// not receive `on_end`.
pub trait TaskBehavior: Send {
    /// Score for this cycle. Only called for primary tasks; anything not
    /// strictly above the selection floor is never selected.
    fn calculate_priority(&mut self, _task: &Task) -> f32 {
        0.0
    }

    /// The task was started or restarted.
    fn on_begin(&mut self, ctx: &mut TaskContext<'_>, args: &InvokeArgs);

    /// The task ended, successfully or not.
    fn on_end(&mut self, _ctx: &mut TaskContext<'_>, _outcome: TaskOutcome) {}

    /// A task this one invoked has finished without being interrupted.
    /// Delivered at the start of the next scheduler update.
    fn on_invoked_task_completed(&mut self, _ctx: &mut TaskContext<'_>, _success: bool) {}

    fn on_perception(&mut self, _ctx: &mut TaskContext<'_>, _source: EntityRef, _stimulus: &Stimulus) {
    }

    fn on_custom_trigger(
        &mut self,
        _ctx: &mut TaskContext<'_>,
        _trigger: &TriggerId,
        _payload: Option<&serde_json::Value>,
    ) {
    }
}
