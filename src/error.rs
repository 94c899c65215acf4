//! Rich diagnostic error types for the scheduler.
//!
//! Nothing in the scheduler is fatal: every error here describes a local,
//! recoverable failure (an unknown task kind, a rejected invocation, a bad
//! config file). Each variant carries a miette code and help text so callers
//! that surface them get an actionable report.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for scheduler operations.
#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    // -----------------------------------------------------------------------
    // Task registry
    // -----------------------------------------------------------------------
    #[error("task kind \"{kind}\" is not registered for this agent")]
    #[diagnostic(
        code(sched::registry::kind_not_registered),
        help(
            "Register a task of this kind with `Scheduler::register` before \
             invoking it or sending it triggers."
        )
    )]
    TaskKindNotRegistered { kind: String },

    #[error("unknown task id {id}")]
    #[diagnostic(
        code(sched::registry::unknown_task),
        help("Task ids are only valid for the scheduler that issued them.")
    )]
    UnknownTask { id: usize },

    #[error("task kind \"{kind}\" is already registered")]
    #[diagnostic(
        code(sched::registry::duplicate_kind),
        help("An agent holds at most one task instance per kind. Use a distinct kind name.")
    )]
    DuplicateTaskKind { kind: String },

    #[error("scheduler is not initialized")]
    #[diagnostic(
        code(sched::registry::not_initialized),
        help("Call `Scheduler::initialize` with an `AgentLink` after registering tasks.")
    )]
    NotInitialized,

    #[error("scheduler is already initialized")]
    #[diagnostic(
        code(sched::registry::already_initialized),
        help("Tasks must be registered before `initialize`; the task set is fixed afterwards.")
    )]
    AlreadyInitialized,

    // -----------------------------------------------------------------------
    // Invocation
    // -----------------------------------------------------------------------
    #[error("task \"{parent}\" already has an outstanding invoked task \"{child}\"")]
    #[diagnostic(
        code(sched::invoke::child_outstanding),
        help(
            "A task may delegate to one child at a time. Wait for the child to \
             complete (on_invoked_task_completed) or end it before invoking again."
        )
    )]
    ChildAlreadyInvoked { parent: String, child: String },

    #[error("invoking \"{kind}\" from \"{parent}\" would create an invocation cycle")]
    #[diagnostic(
        code(sched::invoke::cycle),
        help("A task cannot invoke itself or any task already above it in its invocation chain.")
    )]
    InvocationCycle { parent: String, kind: String },

    #[error("invocation links are inconsistent: {message}")]
    #[diagnostic(
        code(sched::invoke::link_invariant),
        help("This indicates a scheduler bug. Please report it with the trace log attached.")
    )]
    LinkInvariant { message: String },

    // -----------------------------------------------------------------------
    // Configuration
    // -----------------------------------------------------------------------
    #[error("failed to read scheduler config: {path}")]
    #[diagnostic(
        code(sched::config::read),
        help("Ensure the config file exists and is readable.")
    )]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scheduler config: {path}: {message}")]
    #[diagnostic(
        code(sched::config::parse),
        help("Check the TOML syntax. `agent-sched config init` writes a valid default file.")
    )]
    ConfigParse { path: String, message: String },

    #[error("failed to serialize scheduler config for {path}: {message}")]
    #[diagnostic(
        code(sched::config::serialize),
        help("The in-memory config could not be rendered as TOML; nothing was written.")
    )]
    ConfigSerialize { path: String, message: String },

    #[error("failed to write scheduler config: {path}")]
    #[diagnostic(
        code(sched::config::write),
        help("Ensure you have write permissions to the target directory.")
    )]
    ConfigWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config value for \"{field}\": {message}")]
    #[diagnostic(
        code(sched::config::invalid),
        help("Durations and margins must be finite and non-negative; windows and counts positive.")
    )]
    InvalidConfig { field: String, message: String },
}

/// Convenience alias for scheduler operations.
pub type SchedResult<T> = std::result::Result<T, SchedulerError>;
