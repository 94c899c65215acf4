// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # agent-sched
//!
//! A priority-driven behavior scheduler for autonomous agents. Independently
//! scored tasks compete every cycle for control of an agent, subject to
//! cooldowns, an interruption policy, hierarchical invocation and runaway-loop
//! protection.
//!
//! ## Architecture
//!
//! - **Tasks** (`task`): scheduler-owned state plus a user [`TaskBehavior`](task::TaskBehavior)
//! - **Interruption policy** (`interrupt`): margin a candidate needs to preempt
//! - **Loop guard** (`loop_guard`): sliding-window restart counter
//! - **Scheduler** (`scheduler`): ranking, lifecycle, invocation tree, events
//! - **Seams** (`clock`, `timer`, `agent`, `trace`): time, timers, movement,
//!   observers and the structured trace
//!
//! ## Library usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use agent_sched::agent::AgentLink;
//! use agent_sched::clock::MonotonicClock;
//! use agent_sched::config::{SchedulerConfig, TaskConfig};
//! use agent_sched::scheduler::{Scheduler, TaskContext};
//! use agent_sched::task::{InvokeArgs, Task, TaskBehavior};
//!
//! struct Rest;
//!
//! impl TaskBehavior for Rest {
//!     fn calculate_priority(&mut self, _task: &Task) -> f32 {
//!         1.0
//!     }
//!
//!     fn on_begin(&mut self, ctx: &mut TaskContext<'_>, _args: &InvokeArgs) {
//!         ctx.wait(Duration::from_secs(5), None);
//!     }
//! }
//!
//! let mut scheduler = Scheduler::new(SchedulerConfig::default(), Arc::new(MonotonicClock::new()));
//! scheduler.register(TaskConfig::primary("rest"), Box::new(Rest)).unwrap();
//! scheduler.initialize(AgentLink::new("deer")).unwrap();
//! scheduler.update_active_tasks();
//! ```

pub mod agent;
pub mod clock;
pub mod config;
pub mod error;
pub mod interrupt;
pub mod loop_guard;
pub mod perception;
pub mod scheduler;
pub mod sim;
pub mod task;
pub mod timer;
pub mod trace;
