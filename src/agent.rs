//! The owning agent as seen by its scheduler.
//!
//! Everything the scheduler consumes from the agent is expressed as a narrow
//! trait: movement cancellation, entered/exited notifications and the trace
//! sink. [`AgentLink`] bundles them for [`Scheduler::initialize`](crate::scheduler::Scheduler::initialize).

use std::sync::Arc;

use crate::trace::{NullSink, TraceSink};

/// Physical command channel of the agent.
pub trait MovementControl: Send {
    /// Cancel any in-flight movement. Called only when a task is preempted.
    fn stop_movement(&mut self);
}

/// Movement controller for agents that never move.
#[derive(Debug, Default)]
pub struct NoMovement;

impl MovementControl for NoMovement {
    fn stop_movement(&mut self) {}
}

/// Synchronous "any task entered / exited" notifications.
pub trait TaskObserver: Send {
    fn on_task_entered(&mut self, _agent: &str, _task: &str) {}
    fn on_task_exited(&mut self, _agent: &str, _task: &str) {}
}

/// Bindings from a scheduler to the agent it controls.
pub struct AgentLink {
    /// Name used in trace output.
    pub name: String,
    pub movement: Box<dyn MovementControl>,
    pub sink: Arc<dyn TraceSink>,
}

impl AgentLink {
    /// A link with no movement and a discarding trace sink.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            movement: Box::new(NoMovement),
            sink: Arc::new(NullSink),
        }
    }

    pub fn with_movement(mut self, movement: Box<dyn MovementControl>) -> Self {
        self.movement = movement;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }
}

impl std::fmt::Debug for AgentLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentLink")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
