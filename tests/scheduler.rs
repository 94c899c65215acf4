//! End-to-end scheduler behavior: ranking, preemption margins, invocation
//! chains, wait timeouts, the loop guard and event routing.
//!
//! Every test drives a `ManualClock`, so time only moves when a test says so.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use agent_sched::agent::{AgentLink, MovementControl, TaskObserver};
use agent_sched::clock::ManualClock;
use agent_sched::config::{SchedulerConfig, TaskConfig};
use agent_sched::error::SchedulerError;
use agent_sched::interrupt::{InterruptMargins, InterruptType};
use agent_sched::perception::{EntityRef, Location, Stimulus};
use agent_sched::scheduler::{Scheduler, TaskContext};
use agent_sched::task::{DoneWaiting, InvokeArgs, Task, TaskBehavior, TaskId, TaskOutcome, TriggerId};
use agent_sched::trace::{ThoughtLog, TraceEvent};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};

type Log = Arc<Mutex<Vec<String>>>;

/// What a scripted task does when it begins.
#[derive(Debug, Clone, Copy)]
enum OnBegin {
    /// Suspend with no timeout.
    Wait,
    /// Suspend with a timeout.
    WaitFor(Duration),
    /// Return without waiting or ending.
    Nothing,
    /// Delegate to the named kind.
    Invoke(&'static str),
}

struct Scripted {
    kind: String,
    priority: Arc<Mutex<f32>>,
    on_begin: OnBegin,
    log: Log,
}

impl Scripted {
    fn record(&self, entry: String) {
        self.log.lock().unwrap().push(entry);
    }
}

impl TaskBehavior for Scripted {
    fn calculate_priority(&mut self, _task: &Task) -> f32 {
        *self.priority.lock().unwrap()
    }

    fn on_begin(&mut self, ctx: &mut TaskContext<'_>, _args: &InvokeArgs) {
        self.record(format!("begin:{}", self.kind));
        match self.on_begin {
            OnBegin::Wait => ctx.wait(Duration::ZERO, None),
            OnBegin::WaitFor(max) => ctx.wait(max, None),
            OnBegin::Nothing => {}
            OnBegin::Invoke(kind) => {
                ctx.invoke(kind, InvokeArgs::default()).unwrap();
            }
        }
    }

    fn on_end(&mut self, _ctx: &mut TaskContext<'_>, outcome: TaskOutcome) {
        let how = match (outcome.success, outcome.interrupted) {
            (_, true) => "interrupted",
            (true, false) => "ok",
            (false, false) => "failed",
        };
        self.record(format!("end:{}:{how}", self.kind));
    }

    fn on_invoked_task_completed(&mut self, ctx: &mut TaskContext<'_>, success: bool) {
        self.record(format!("completed:{}:{success}", self.kind));
        ctx.end(success);
    }

    fn on_perception(&mut self, _ctx: &mut TaskContext<'_>, source: EntityRef, _stimulus: &Stimulus) {
        self.record(format!("saw:{}:{}", self.kind, source.0));
    }

    fn on_custom_trigger(
        &mut self,
        _ctx: &mut TaskContext<'_>,
        trigger: &TriggerId,
        _payload: Option<&serde_json::Value>,
    ) {
        self.record(format!("trigger:{}:{trigger}", self.kind));
    }
}

struct CountStops(Arc<AtomicUsize>);

impl MovementControl for CountStops {
    fn stop_movement(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

struct Recorder(Log);

impl TaskObserver for Recorder {
    fn on_task_entered(&mut self, _agent: &str, task: &str) {
        self.0.lock().unwrap().push(format!("entered:{task}"));
    }

    fn on_task_exited(&mut self, _agent: &str, task: &str) {
        self.0.lock().unwrap().push(format!("exited:{task}"));
    }
}

/// Counts `WARN` events emitted while it is the active subscriber.
#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl WarnCounter {
    fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

impl<S: tracing::Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == tracing::Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct Harness {
    clock: ManualClock,
    sched: Scheduler,
    log: Log,
    observed: Log,
    priorities: HashMap<String, Arc<Mutex<f32>>>,
    stops: Arc<AtomicUsize>,
    thoughts: Arc<ThoughtLog>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    fn with_config(config: SchedulerConfig) -> Self {
        let clock = ManualClock::new();
        Self {
            sched: Scheduler::new(config, Arc::new(clock.clone())),
            clock,
            log: Log::default(),
            observed: Log::default(),
            priorities: HashMap::new(),
            stops: Arc::new(AtomicUsize::new(0)),
            thoughts: Arc::new(ThoughtLog::new(1000)),
        }
    }

    fn task(&mut self, config: TaskConfig, priority: f32, on_begin: OnBegin) -> TaskId {
        let shared = Arc::new(Mutex::new(priority));
        self.priorities.insert(config.kind.clone(), shared.clone());
        let scripted = Scripted {
            kind: config.kind.clone(),
            priority: shared,
            on_begin,
            log: self.log.clone(),
        };
        self.sched.register(config, Box::new(scripted)).unwrap()
    }

    fn init(&mut self) {
        self.sched
            .add_observer(Box::new(Recorder(self.observed.clone())));
        self.sched
            .initialize(
                AgentLink::new("tester")
                    .with_movement(Box::new(CountStops(self.stops.clone())))
                    .with_sink(self.thoughts.clone()),
            )
            .unwrap();
    }

    fn set_priority(&self, kind: &str, priority: f32) {
        *self.priorities[kind].lock().unwrap() = priority;
    }

    fn advance_ms(&self, ms: u64) {
        self.clock.advance(Duration::from_millis(ms));
    }

    fn tick(&mut self) {
        self.sched.update_active_tasks();
    }

    fn state(&self, id: TaskId) -> &Task {
        self.sched.task(id).unwrap()
    }

    fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, entry: &str) -> usize {
        self.events().iter().filter(|e| *e == entry).count()
    }
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

#[test]
fn selects_highest_ready_priority() {
    let mut h = Harness::new();
    h.task(TaskConfig::primary("low"), 10.0, OnBegin::Wait);
    let high = h.task(TaskConfig::primary("high"), 30.0, OnBegin::Wait);
    h.task(TaskConfig::primary("mid"), 20.0, OnBegin::Wait);
    h.init();

    h.tick();
    assert_eq!(h.sched.active_task(), Some(high));
    assert_eq!(h.events(), vec!["begin:high"]);
}

#[test]
fn floor_score_is_never_selected() {
    let mut h = Harness::new();
    h.task(TaskConfig::primary("zero"), 0.0, OnBegin::Wait);
    h.task(TaskConfig::primary("negative"), -5.0, OnBegin::Wait);
    h.init();

    h.tick();
    assert_eq!(h.sched.active_task(), None);
    assert!(h.events().is_empty());
}

#[test]
fn ties_go_to_first_registered() {
    let mut h = Harness::new();
    let first = h.task(TaskConfig::primary("first"), 50.0, OnBegin::Wait);
    h.task(TaskConfig::primary("second"), 50.0, OnBegin::Wait);
    h.init();

    h.tick();
    assert_eq!(h.sched.active_task(), Some(first));
}

#[test]
fn cooling_down_task_is_skipped() {
    let mut h = Harness::new();
    let best = h.task(
        TaskConfig::primary("best").with_cooldown_secs(5.0),
        90.0,
        OnBegin::Wait,
    );
    let fallback = h.task(TaskConfig::primary("fallback"), 10.0, OnBegin::Wait);
    h.init();

    h.tick();
    assert_eq!(h.sched.active_task(), Some(best));
    h.sched.end_task(best, true, Duration::ZERO, false).unwrap();

    h.advance_ms(1000);
    h.tick();
    assert_eq!(h.sched.active_task(), Some(fallback));

    // Ready again: 90 - 10 beats `Always`.
    h.advance_ms(4000);
    h.tick();
    assert_eq!(h.sched.active_task(), Some(best));
}

#[test]
fn disabled_primary_is_not_ranked() {
    let mut h = Harness::new();
    h.task(TaskConfig::primary("off").disabled(), 99.0, OnBegin::Wait);
    let on = h.task(TaskConfig::primary("on"), 1.0, OnBegin::Wait);
    h.init();

    h.tick();
    assert_eq!(h.sched.active_task(), Some(on));
}

// ---------------------------------------------------------------------------
// Interruption policy
// ---------------------------------------------------------------------------

#[test]
fn margins_are_strict_for_every_interrupt_type() {
    let margins = InterruptMargins::default();
    for interrupt in InterruptType::ALL {
        let Some(gap) = margins.required_margin(interrupt) else {
            continue;
        };
        for (bump, expect_switch) in [(gap, false), (gap + 1.0, true)] {
            let mut h = Harness::new();
            let current = h.task(
                TaskConfig::primary("current").with_interrupt(interrupt),
                100.0,
                OnBegin::Wait,
            );
            let rival = h.task(TaskConfig::primary("rival"), 0.0, OnBegin::Wait);
            h.init();
            h.tick();
            assert_eq!(h.sched.active_task(), Some(current));

            h.set_priority("rival", 100.0 + bump);
            h.tick();
            let expected = if expect_switch { rival } else { current };
            assert_eq!(
                h.sched.active_task(),
                Some(expected),
                "{interrupt} with margin {bump}"
            );
        }
    }
}

#[test]
fn never_is_never_displaced() {
    let mut h = Harness::new();
    let stubborn = h.task(
        TaskConfig::primary("stubborn").with_interrupt(InterruptType::Never),
        1.0,
        OnBegin::Wait,
    );
    h.task(TaskConfig::primary("urgent"), 0.0, OnBegin::Wait);
    h.init();
    h.tick();

    h.set_priority("urgent", f32::MAX);
    for _ in 0..5 {
        h.tick();
    }
    assert_eq!(h.sched.active_task(), Some(stubborn));
    assert_eq!(h.count("begin:urgent"), 0);
}

#[test]
fn only_if_needed_example() {
    let mut h = Harness::new();
    let a = h.task(
        TaskConfig::primary("a").with_interrupt(InterruptType::OnlyIfNeeded),
        50.0,
        OnBegin::Wait,
    );
    let b = h.task(TaskConfig::primary("b"), 40.0, OnBegin::Wait);
    h.init();
    h.tick();
    assert_eq!(h.sched.active_task(), Some(a));

    h.set_priority("b", 90.0);
    h.tick();
    assert_eq!(h.sched.active_task(), Some(a), "margin 40 must not preempt");

    h.set_priority("b", 96.0);
    h.tick();
    assert_eq!(h.sched.active_task(), Some(b), "margin 46 must preempt");
    assert_eq!(h.count("end:a:interrupted"), 1);
    assert_eq!(h.stops.load(Ordering::SeqCst), 1);
}

#[test]
fn preemption_notifies_observers() {
    let mut h = Harness::new();
    h.task(TaskConfig::primary("a"), 10.0, OnBegin::Wait);
    h.task(TaskConfig::primary("b"), 0.0, OnBegin::Wait);
    h.init();
    h.tick();
    h.set_priority("b", 20.0);
    h.tick();

    let observed = h.observed.lock().unwrap().clone();
    assert_eq!(observed, vec!["entered:a", "exited:a", "entered:b"]);
    let preempted = h
        .thoughts
        .entries()
        .into_iter()
        .any(|e| matches!(e, TraceEvent::Preempted { ref candidate, .. } if candidate == "b"));
    assert!(preempted);
}

// ---------------------------------------------------------------------------
// Invocation
// ---------------------------------------------------------------------------

fn three_deep(h: &mut Harness) -> (TaskId, TaskId, TaskId) {
    let root = h.task(TaskConfig::primary("root"), 40.0, OnBegin::Invoke("mid"));
    let mid = h.task(TaskConfig::invoked("mid"), 0.0, OnBegin::Invoke("leaf"));
    let leaf = h.task(TaskConfig::invoked("leaf"), 0.0, OnBegin::Wait);
    (root, mid, leaf)
}

#[test]
fn invoked_task_inherits_oldest_ancestor_priority() {
    let mut h = Harness::new();
    let (root, mid, leaf) = three_deep(&mut h);
    h.init();
    h.tick();

    assert_eq!(h.sched.active_task(), Some(leaf));
    assert_eq!(h.state(leaf).priority(), 0.0);
    assert_eq!(h.sched.get_priority(leaf).unwrap(), 40.0);
    assert_eq!(h.sched.get_priority(mid).unwrap(), 40.0);
    assert_eq!(h.sched.oldest_invoking_ancestor(leaf).unwrap(), Some(root));
    assert_eq!(h.sched.oldest_invoking_ancestor(root).unwrap(), None);
    assert!(h.sched.is_ancestor_of(root, leaf).unwrap());
    assert!(!h.sched.is_ancestor_of(leaf, root).unwrap());
    assert!(h.sched.is_descendant_of(leaf, root).unwrap());
    assert!(h.state(root).is_waiting());
    assert!(h.state(mid).is_waiting());
    h.sched.check_invocation_links().unwrap();
}

#[test]
fn running_chain_is_not_restarted_by_its_root() {
    let mut h = Harness::new();
    let (_, _, leaf) = three_deep(&mut h);
    h.init();
    for _ in 0..3 {
        h.tick();
    }
    assert_eq!(h.sched.active_task(), Some(leaf));
    assert_eq!(h.count("begin:root"), 1);
}

#[test]
fn chain_teardown_ends_each_task_once_parent_first() {
    let mut h = Harness::new();
    let (root, mid, leaf) = three_deep(&mut h);
    let rival = h.task(TaskConfig::primary("rival"), 0.0, OnBegin::Wait);
    h.init();
    h.tick();

    h.set_priority("rival", 60.0);
    h.tick();

    let ends: Vec<_> = h
        .events()
        .into_iter()
        .filter(|e| e.starts_with("end:"))
        .collect();
    assert_eq!(
        ends,
        vec!["end:root:interrupted", "end:mid:interrupted", "end:leaf:interrupted"]
    );
    for id in [root, mid, leaf] {
        let t = h.state(id);
        assert!(!t.is_active());
        assert!(!t.is_waiting());
        assert_eq!(t.parent(), None);
        assert_eq!(t.child(), None);
    }
    assert_eq!(h.sched.active_task(), Some(rival));
    assert_eq!(h.count("completed:root:false"), 0);
    h.sched.check_invocation_links().unwrap();
}

#[test]
fn child_completion_returns_control_next_cycle() {
    let mut h = Harness::new();
    let root = h.task(TaskConfig::primary("root"), 40.0, OnBegin::Invoke("child"));
    let child = h.task(TaskConfig::invoked("child"), 0.0, OnBegin::Wait);
    h.init();
    h.tick();
    assert_eq!(h.sched.active_task(), Some(child));

    h.sched.end_task(child, true, Duration::ZERO, false).unwrap();
    assert_eq!(h.sched.active_task(), Some(root));
    assert!(!h.state(root).is_waiting());
    assert_eq!(h.state(root).child(), None);
    assert_eq!(h.count("completed:root:true"), 0);

    h.advance_ms(10);
    h.tick();
    assert_eq!(h.count("completed:root:true"), 1);
    assert!(h.count("end:root:ok") >= 1);
}

#[test]
fn invoke_unknown_kind_leaves_no_links() {
    let mut h = Harness::new();
    let root = h.task(TaskConfig::primary("root"), 40.0, OnBegin::Wait);
    h.init();
    h.tick();

    let err = h
        .sched
        .invoke("missing", root, InvokeArgs::default())
        .unwrap_err();
    assert!(matches!(err, SchedulerError::TaskKindNotRegistered { .. }));
    assert_eq!(h.state(root).child(), None);
    assert!(h.state(root).is_waiting());
    assert_eq!(h.sched.active_task(), Some(root));
}

#[test]
fn invoke_cycles_are_rejected() {
    let mut h = Harness::new();
    let root = h.task(TaskConfig::primary("root"), 40.0, OnBegin::Invoke("mid"));
    let mid = h.task(TaskConfig::invoked("mid"), 0.0, OnBegin::Wait);
    h.init();
    h.tick();

    let err = h.sched.invoke("root", mid, InvokeArgs::default()).unwrap_err();
    assert!(matches!(err, SchedulerError::InvocationCycle { .. }));
    let err = h.sched.invoke("mid", mid, InvokeArgs::default()).unwrap_err();
    assert!(matches!(err, SchedulerError::InvocationCycle { .. }));
    assert_eq!(h.state(mid).child(), None);
    assert_eq!(h.state(root).child(), Some(mid));
    h.sched.check_invocation_links().unwrap();
}

#[test]
fn second_outstanding_child_is_rejected() {
    let mut h = Harness::new();
    let root = h.task(TaskConfig::primary("root"), 40.0, OnBegin::Invoke("first"));
    let first = h.task(TaskConfig::invoked("first"), 0.0, OnBegin::Wait);
    let second = h.task(TaskConfig::invoked("second"), 0.0, OnBegin::Wait);
    h.init();
    h.tick();

    let err = h
        .sched
        .invoke("second", root, InvokeArgs::default())
        .unwrap_err();
    assert!(matches!(err, SchedulerError::ChildAlreadyInvoked { .. }));
    assert_eq!(h.state(root).child(), Some(first));
    assert_eq!(h.state(second).parent(), None);
    assert!(!h.state(second).is_active());
}

// ---------------------------------------------------------------------------
// Waiting
// ---------------------------------------------------------------------------

#[test]
fn wait_timeout_force_interrupts() {
    let mut h = Harness::new();
    let a = h.task(
        TaskConfig::primary("a").with_cooldown_secs(10.0),
        50.0,
        OnBegin::WaitFor(Duration::from_secs(2)),
    );
    h.init();
    h.tick();
    assert!(h.state(a).is_waiting());
    assert_eq!(h.sched.pending_timers(), 1);

    h.advance_ms(1900);
    h.tick();
    assert!(h.state(a).is_active());

    h.advance_ms(200);
    h.tick();
    assert!(!h.state(a).is_waiting());
    assert!(!h.state(a).is_active());
    assert_eq!(h.sched.active_task(), None);
    assert_eq!(h.count("end:a:failed"), 1);
    let timed_out = h
        .thoughts
        .entries()
        .into_iter()
        .any(|e| matches!(e, TraceEvent::TimedOut { .. }));
    assert!(timed_out);
}

#[test]
fn timed_out_child_hands_control_back() {
    let mut h = Harness::new();
    let root = h.task(TaskConfig::primary("root"), 40.0, OnBegin::Invoke("walk"));
    h.task(
        TaskConfig::invoked("walk"),
        0.0,
        OnBegin::WaitFor(Duration::from_secs(1)),
    );
    h.init();
    h.tick();

    h.advance_ms(1000);
    h.tick();
    assert_eq!(h.count("end:walk:failed"), 1);
    assert_eq!(h.sched.active_task(), Some(root));

    h.advance_ms(10);
    h.tick();
    assert_eq!(h.count("completed:root:false"), 1);
}

#[test]
fn done_waiting_cancels_the_timeout() {
    let mut h = Harness::new();
    let a = h.task(
        TaskConfig::primary("a").with_cooldown_secs(10.0),
        50.0,
        OnBegin::WaitFor(Duration::from_secs(2)),
    );
    h.init();
    h.tick();

    let branch = h.sched.done_waiting(a, InterruptType::Always).unwrap();
    assert_eq!(branch, DoneWaiting::Continue);
    assert_eq!(h.sched.pending_timers(), 0);

    h.advance_ms(3000);
    h.tick();
    assert!(h.state(a).is_active());
    assert_eq!(h.count("end:a:failed"), 0);
}

#[test]
fn done_waiting_after_preemption_reports_task_ended() {
    let mut h = Harness::new();
    let a = h.task(TaskConfig::primary("a"), 10.0, OnBegin::Wait);
    h.task(TaskConfig::primary("b"), 0.0, OnBegin::Wait);
    h.init();
    h.tick();
    h.set_priority("b", 50.0);
    h.tick();

    let branch = h.sched.done_waiting(a, InterruptType::Always).unwrap();
    assert_eq!(branch, DoneWaiting::TaskEnded);
}

#[test]
fn interrupt_override_lasts_while_waiting() {
    let mut h = Harness::new();
    let a = h.task(TaskConfig::primary("a"), 10.0, OnBegin::Nothing);
    h.init();
    h.tick();

    h.sched
        .wait(a, Duration::ZERO, Some(InterruptType::Never))
        .unwrap();
    assert_eq!(h.state(a).interrupt_type(), InterruptType::Never);

    h.sched.done_waiting(a, InterruptType::WaitASec).unwrap();
    assert_eq!(h.state(a).interrupt_type(), InterruptType::WaitASec);

    h.sched.end_task(a, true, Duration::ZERO, false).unwrap();
    assert_eq!(h.state(a).interrupt_type(), InterruptType::Always);
}

#[test]
fn unbounded_wait_has_no_timeout() {
    let mut h = Harness::new();
    let a = h.task(
        TaskConfig::primary("a").with_cooldown_secs(10.0),
        50.0,
        OnBegin::WaitFor(Duration::MAX),
    );
    h.init();
    h.advance_ms(1000);
    h.tick();
    assert!(h.state(a).is_waiting());
    assert_eq!(h.sched.pending_timers(), 0);

    h.clock.advance(Duration::from_secs(3600));
    h.tick();
    assert!(h.state(a).is_waiting());
    assert_eq!(h.count("end:a:failed"), 0);

    let branch = h.sched.done_waiting(a, InterruptType::Always).unwrap();
    assert_eq!(branch, DoneWaiting::Continue);
}

#[test]
fn superseded_wait_timer_never_fires() {
    let mut h = Harness::new();
    let a = h.task(
        TaskConfig::primary("a"),
        50.0,
        OnBegin::WaitFor(Duration::from_secs(1)),
    );
    h.init();
    h.tick();

    h.advance_ms(500);
    h.sched.end_task(a, true, Duration::ZERO, false).unwrap();
    h.tick();
    assert_eq!(h.count("begin:a"), 2);

    // The first timer would have been due at 1.0s.
    h.advance_ms(600);
    h.tick();
    assert!(h.state(a).is_waiting());
    assert_eq!(h.count("end:a:failed"), 0);

    h.advance_ms(500);
    h.tick();
    assert_eq!(h.count("end:a:failed"), 1);
}

#[test]
fn next_begin_cooldown_applies_once() {
    let mut h = Harness::new();
    let a = h.task(TaskConfig::primary("a"), 50.0, OnBegin::Wait);
    h.init();
    h.tick();

    h.sched
        .end_task(a, true, Duration::from_secs(2), false)
        .unwrap();
    h.advance_ms(1000);
    h.tick();
    assert_eq!(h.count("begin:a"), 1);

    h.advance_ms(1000);
    h.tick();
    assert_eq!(h.count("begin:a"), 2);
    assert_eq!(h.state(a).next_begin_cooldown(), None);
}

// ---------------------------------------------------------------------------
// Re-drive and loop guard
// ---------------------------------------------------------------------------

#[test]
fn task_that_never_suspends_is_redriven_once_per_cycle() {
    let mut h = Harness::new();
    let stuck = h.task(TaskConfig::primary("stuck"), 10.0, OnBegin::Nothing);
    h.init();

    let warnings = WarnCounter::default();
    let subscriber = tracing_subscriber::registry().with(warnings.clone());
    tracing::subscriber::with_default(subscriber, || {
        for cycle in 1..=5 {
            h.advance_ms(10);
            h.tick();
            assert_eq!(h.count("begin:stuck"), cycle);
            assert!(h.sched.reinvoke_pending());
            assert_eq!(h.sched.active_task(), Some(stuck));
        }
    });
    assert_eq!(warnings.get(), 1, "one warning per offending kind");
}

#[test]
fn loop_guard_throttles_the_whole_chain() {
    let mut h = Harness::new();
    let root = h.task(TaskConfig::primary("root"), 50.0, OnBegin::Invoke("spin"));
    let spin = h.task(TaskConfig::invoked("spin"), 0.0, OnBegin::Nothing);
    h.init();

    for _ in 0..25 {
        h.advance_ms(10);
        h.tick();
    }
    assert_eq!(h.count("begin:spin"), 25);
    assert!(h.state(spin).is_loop_penalized());
    assert_eq!(h.state(spin).penalty_cooldown(), Some(Duration::from_secs(1)));
    assert_eq!(h.state(root).penalty_cooldown(), Some(Duration::from_secs(1)));
    assert!(!h.sched.reinvoke_pending());

    // A restart inside the penalty is deferred and shielded from preemption.
    h.sched
        .set_interrupt_type(spin, InterruptType::IfPanic)
        .unwrap();
    h.sched.restart_task(spin).unwrap();
    assert_eq!(h.count("begin:spin"), 25);
    assert_eq!(h.state(spin).interrupt_type(), InterruptType::Never);
    assert_eq!(h.sched.pending_timers(), 1);

    // Still nothing before the cooldown elapses.
    h.advance_ms(500);
    h.tick();
    assert_eq!(h.count("begin:spin"), 25);

    h.advance_ms(600);
    h.tick();
    assert_eq!(h.count("begin:spin"), 26);
    assert_eq!(h.state(spin).interrupt_type(), InterruptType::IfPanic);
    assert_eq!(h.sched.pending_timers(), 0);
    assert!(!h.state(spin).is_loop_penalized());
    assert_eq!(h.state(spin).penalty_cooldown(), None);

    let penalties = h
        .thoughts
        .entries()
        .into_iter()
        .filter(|e| matches!(e, TraceEvent::LoopPenalty { .. }))
        .count();
    assert_eq!(penalties, 1);
}

#[test]
fn slow_restarts_never_trip_the_guard() {
    let mut h = Harness::new();
    let stuck = h.task(TaskConfig::primary("stuck"), 10.0, OnBegin::Nothing);
    h.init();

    for _ in 0..60 {
        h.advance_ms(100);
        h.tick();
    }
    assert!(!h.state(stuck).is_loop_penalized());
    assert_eq!(h.count("begin:stuck"), 60);
}

#[test]
fn inactive_scheduler_blocks_starts_and_restarts() {
    let mut h = Harness::new();
    let a = h.task(TaskConfig::primary("a"), 10.0, OnBegin::Wait);
    h.init();

    h.sched.set_scheduler_active(false);
    h.tick();
    assert_eq!(h.sched.active_task(), None);

    h.sched.set_scheduler_active(true);
    h.tick();
    assert_eq!(h.sched.active_task(), Some(a));

    h.sched.set_scheduler_active(false);
    h.sched.restart_task(a).unwrap();
    assert_eq!(h.count("begin:a"), 1);
    assert!(h.state(a).is_active(), "disabling does not end the active task");
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

#[test]
fn perception_reaches_enabled_tasks_only() {
    let mut h = Harness::new();
    h.task(TaskConfig::primary("eyes"), 0.0, OnBegin::Wait);
    h.task(TaskConfig::invoked("asleep").disabled(), 0.0, OnBegin::Wait);
    h.init();

    h.sched
        .on_sensory_event(EntityRef(7), &Stimulus::sighted(Location::default(), 1.0));
    assert_eq!(h.events(), vec!["saw:eyes:7"]);
}

#[test]
fn custom_trigger_targets_one_kind_or_all() {
    let mut h = Harness::new();
    h.task(TaskConfig::primary("a"), 0.0, OnBegin::Wait);
    h.task(TaskConfig::primary("b"), 0.0, OnBegin::Wait);
    h.init();

    let ping = TriggerId::new("ping");
    h.sched.on_custom_trigger(Some("b"), &ping, None).unwrap();
    assert_eq!(h.events(), vec!["trigger:b:ping"]);

    h.sched.on_custom_trigger(None, &ping, None).unwrap();
    assert_eq!(h.count("trigger:a:ping"), 1);
    assert_eq!(h.count("trigger:b:ping"), 2);

    let err = h
        .sched
        .on_custom_trigger(Some("c"), &ping, None)
        .unwrap_err();
    assert!(matches!(err, SchedulerError::TaskKindNotRegistered { .. }));
    assert_eq!(h.events().len(), 3);
}

#[test]
fn stale_force_interrupt_is_ignored() {
    let mut h = Harness::new();
    let a = h.task(TaskConfig::primary("a"), 10.0, OnBegin::Wait);
    let b = h.task(TaskConfig::primary("b"), 0.0, OnBegin::Wait);
    h.init();
    h.tick();

    h.sched.force_interrupt_active_task(b);
    assert_eq!(h.sched.active_task(), Some(a));
    assert!(h.state(a).is_active());

    h.sched.force_interrupt_active_task(a);
    assert_eq!(h.sched.active_task(), None);
    assert_eq!(h.count("end:a:failed"), 1);
}

#[test]
fn snapshot_serializes_chain_state() {
    let mut h = Harness::new();
    three_deep(&mut h);
    h.init();
    h.tick();

    let snap = h.sched.snapshot();
    assert_eq!(snap.active.as_deref(), Some("leaf"));
    let json = serde_json::to_value(&snap).unwrap();
    assert_eq!(json["tasks"][1]["parent"], "root");
    assert_eq!(json["tasks"][1]["child"], "leaf");
    assert_eq!(json["tasks"][0]["interrupt"], "always");
}
