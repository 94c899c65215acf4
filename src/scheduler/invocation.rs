//! Delegation between tasks and the invocation-tree queries built on it.

use crate::error::{SchedResult, SchedulerError};
use crate::scheduler::{Completion, Scheduler};
use crate::task::{InvokeArgs, TaskId, TaskKind};
use crate::trace::TraceEvent;

impl Scheduler {
    /// Start the task registered as `kind` on behalf of `parent`.
    ///
    /// The parent waits until the child ends. Fails without touching any link
    /// if the kind is unknown, the child is the parent or one of its
    /// ancestors, or either side is already linked to another child.
    pub fn invoke(&mut self, kind: &str, parent: TaskId, args: InvokeArgs) -> SchedResult<TaskId> {
        self.check_id(parent)?;
        let child = self.get_task_by_kind(kind)?;

        if child == parent || self.is_ancestor_of_unchecked(child, parent) {
            return Err(SchedulerError::InvocationCycle {
                parent: self.state(parent).kind.to_string(),
                kind: kind.to_string(),
            });
        }
        if let Some(existing) = self.state(parent).child {
            return Err(SchedulerError::ChildAlreadyInvoked {
                parent: self.state(parent).kind.to_string(),
                child: self.state(existing).kind.to_string(),
            });
        }
        if let Some(other) = self.state(child).parent {
            return Err(SchedulerError::ChildAlreadyInvoked {
                parent: self.state(other).kind.to_string(),
                child: kind.to_string(),
            });
        }

        self.state_mut(child).parent = Some(parent);
        self.state_mut(child).args = args.clone();
        let p = self.state_mut(parent);
        p.child = Some(child);
        p.waiting = true;
        self.debug_check_links();

        tracing::debug!(task = %self.state(parent).kind, child = kind, "invoking task");
        let event = TraceEvent::Invoked {
            agent: self.agent_name.clone(),
            parent: self.state(parent).kind.to_string(),
            child: kind.to_string(),
        };
        self.emit(event);

        self.start_unchecked(child, args);
        Ok(child)
    }

    /// Look up the task registered as `kind`. A miss is logged.
    pub fn get_task_by_kind(&self, kind: &str) -> SchedResult<TaskId> {
        match self.by_kind.get(&TaskKind::from(kind)) {
            Some(id) => Ok(*id),
            None => {
                tracing::error!(
                    agent = %self.agent_name,
                    task = kind,
                    "could not find task kind, was it registered for this agent?"
                );
                Err(SchedulerError::TaskKindNotRegistered {
                    kind: kind.to_string(),
                })
            }
        }
    }

    /// Priority used for interruption decisions: a primary task's own score,
    /// or, for an invoked task, the score of its oldest invoking ancestor.
    pub fn get_priority(&self, id: TaskId) -> SchedResult<f32> {
        self.check_id(id)?;
        Ok(self.get_priority_unchecked(id))
    }

    /// Root of `id`'s invocation chain, or `None` if `id` is top-level.
    pub fn oldest_invoking_ancestor(&self, id: TaskId) -> SchedResult<Option<TaskId>> {
        self.check_id(id)?;
        Ok(self.oldest_invoking_ancestor_unchecked(id))
    }

    /// Whether `ancestor` is reached by walking `id`'s parent links.
    pub fn is_ancestor_of(&self, ancestor: TaskId, id: TaskId) -> SchedResult<bool> {
        self.check_id(ancestor)?;
        self.check_id(id)?;
        Ok(self.is_ancestor_of_unchecked(ancestor, id))
    }

    /// Whether `descendant` is reached by walking `id`'s child links.
    pub fn is_descendant_of(&self, descendant: TaskId, id: TaskId) -> SchedResult<bool> {
        self.check_id(descendant)?;
        self.check_id(id)?;
        Ok(self.is_descendant_of_unchecked(descendant, id))
    }

    /// Verify parent/child symmetry, a single child per task and the absence
    /// of cycles.
    pub fn check_invocation_links(&self) -> SchedResult<()> {
        let broken = |message: String| SchedulerError::LinkInvariant { message };
        for slot in &self.slots {
            let task = &slot.task;
            if let Some(parent) = task.parent {
                let back = self.slots.get(parent.0).and_then(|s| s.task.child);
                if back != Some(task.id) {
                    return Err(broken(format!(
                        "{} names {parent} as parent, but that task's child is {back:?}",
                        task.kind
                    )));
                }
            }
            if let Some(child) = task.child {
                let back = self.slots.get(child.0).and_then(|s| s.task.parent);
                if back != Some(task.id) {
                    return Err(broken(format!(
                        "{} names {child} as child, but that task's parent is {back:?}",
                        task.kind
                    )));
                }
            }
            let mut cursor = task.parent;
            let mut steps = 0;
            while let Some(current) = cursor {
                steps += 1;
                if current == task.id || steps > self.slots.len() {
                    return Err(broken(format!("{} is part of an invocation cycle", task.kind)));
                }
                cursor = self.slots.get(current.0).and_then(|s| s.task.parent);
            }
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    pub(super) fn get_priority_unchecked(&self, id: TaskId) -> f32 {
        let task = self.state(id);
        if !task.primary {
            if let Some(root) = self.oldest_invoking_ancestor_unchecked(id) {
                return self.state(root).priority;
            }
        }
        task.priority
    }

    pub(super) fn oldest_invoking_ancestor_unchecked(&self, id: TaskId) -> Option<TaskId> {
        let mut root = None;
        let mut cursor = self.state(id).parent;
        let mut steps = 0;
        while let Some(current) = cursor {
            root = Some(current);
            cursor = self.state(current).parent;
            steps += 1;
            if steps > self.slots.len() {
                break;
            }
        }
        root
    }

    pub(super) fn is_ancestor_of_unchecked(&self, ancestor: TaskId, id: TaskId) -> bool {
        let mut cursor = self.state(id).parent;
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            cursor = self.state(current).parent;
            steps += 1;
            if steps > self.slots.len() {
                break;
            }
        }
        false
    }

    pub(super) fn is_descendant_of_unchecked(&self, descendant: TaskId, id: TaskId) -> bool {
        let mut cursor = self.state(id).child;
        let mut steps = 0;
        while let Some(current) = cursor {
            if current == descendant {
                return true;
            }
            cursor = self.state(current).child;
            steps += 1;
            if steps > self.slots.len() {
                break;
            }
        }
        false
    }

    /// Called at the start of every `end`: release control if `id` held it.
    pub(super) fn task_ended(&mut self, id: TaskId) {
        if self.active == Some(id) {
            self.active = None;
        }
    }

    /// A child finished without being interrupted: control goes back to the
    /// parent, which hears about it on the next cycle.
    pub(super) fn return_to_invoking_task(&mut self, completed: TaskId, parent: TaskId, success: bool) {
        self.active = Some(parent);
        self.completions.push_back(Completion {
            parent,
            child: completed,
            success,
        });
    }
}
