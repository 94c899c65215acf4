//! Deterministic demo agent for the `simulate` command.
//!
//! A deer wanders a flat field, gets hungry, walks to food and runs from
//! predators. Four tasks drive it:
//!
//! - `wander` (primary): stroll to a random nearby point now and then
//! - `eat` (primary): score grows with hunger; walks to the nearest food
//! - `flee` (primary): scores high while a predator is close
//! - `move_to` (invoked): walks to `target_location`, waiting for arrival
//!
//! Time comes from a [`ManualClock`] advanced by a fixed step, and every
//! random choice from a seeded [`StdRng`], so a run is fully reproducible.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::agent::{AgentLink, MovementControl, TaskObserver};
use crate::clock::{Clock, ManualClock};
use crate::config::{SchedulerConfig, TaskConfig};
use crate::error::SchedResult;
use crate::interrupt::InterruptType;
use crate::perception::{EntityRef, Location, Stimulus};
use crate::scheduler::{Scheduler, SchedulerSnapshot, TaskContext};
use crate::task::{DoneWaiting, InvokeArgs, Task, TaskBehavior, TaskOutcome, TriggerId};
use crate::trace::TraceSink;

/// Trigger sent to `move_to` when the agent reaches its destination.
pub const ARRIVED: &str = "arrived";

const WALK_SPEED: f32 = 2.0;
const RUN_SPEED: f32 = 6.0;
const HUNGER_PER_SEC: f32 = 2.5;
const THREAT_RADIUS: f32 = 20.0;
const THREAT_CHANCE_PER_SEC: f64 = 0.03;
const THREAT_STAY_SECS: f64 = 6.0;
const PREDATOR: EntityRef = EntityRef(1000);

/// Task setup used when the config file lists no tasks.
pub fn default_tasks() -> Vec<TaskConfig> {
    vec![
        TaskConfig::primary("wander")
            .with_cooldown_secs(3.0)
            .with_interrupt(InterruptType::WaitASec),
        TaskConfig::primary("eat").with_interrupt(InterruptType::PreferablyNot),
        TaskConfig::primary("flee").with_interrupt(InterruptType::IfLifeOrDeath),
        TaskConfig::invoked("move_to"),
    ]
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct MoveOrder {
    destination: Location,
    speed: f32,
}

#[derive(Debug)]
struct Threat {
    location: Location,
    leaves_at: Duration,
}

/// Scripted environment shared by the behaviors and the movement controller.
#[derive(Debug)]
pub struct World {
    position: Location,
    hunger: f32,
    food: Vec<Location>,
    threat: Option<Threat>,
    order: Option<MoveOrder>,
    rng: StdRng,
}

impl World {
    fn new(seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let food = (0..3)
            .map(|_| {
                Location::new(rng.gen_range(-30.0_f32..30.0), rng.gen_range(-30.0_f32..30.0), 0.0)
            })
            .collect();
        Self {
            position: Location::default(),
            hunger: 20.0,
            food,
            threat: None,
            order: None,
            rng,
        }
    }

    pub fn position(&self) -> Location {
        self.position
    }

    pub fn hunger(&self) -> f32 {
        self.hunger
    }

    fn threat_distance(&self) -> Option<f32> {
        self.threat
            .as_ref()
            .map(|t| t.location.distance(&self.position))
    }

    fn nearest_food(&self) -> Option<Location> {
        self.food.iter().copied().min_by(|a, b| {
            a.distance(&self.position)
                .total_cmp(&b.distance(&self.position))
        })
    }

    /// Advance movement and hunger by `dt`. Returns whether a move finished.
    fn advance(&mut self, dt: f32) -> bool {
        self.hunger = (self.hunger + HUNGER_PER_SEC * dt).min(100.0);
        let Some(order) = self.order else {
            return false;
        };
        let remaining = self.position.distance(&order.destination);
        let step = order.speed * dt;
        if remaining <= step {
            self.position = order.destination;
            self.order = None;
            return true;
        }
        let f = step / remaining;
        self.position = Location::new(
            self.position.x + (order.destination.x - self.position.x) * f,
            self.position.y + (order.destination.y - self.position.y) * f,
            self.position.z + (order.destination.z - self.position.z) * f,
        );
        false
    }
}

/// Handle to the world shared across hooks.
pub type SharedWorld = Arc<Mutex<World>>;

fn lock(world: &SharedWorld) -> MutexGuard<'_, World> {
    world.lock().unwrap_or_else(|e| e.into_inner())
}

struct WorldMovement(SharedWorld);

impl MovementControl for WorldMovement {
    fn stop_movement(&mut self) {
        lock(&self.0).order = None;
    }
}

/// Counts how often each task gained control.
#[derive(Clone, Default)]
struct EntryCounter(Arc<Mutex<BTreeMap<String, usize>>>);

impl TaskObserver for EntryCounter {
    fn on_task_entered(&mut self, _agent: &str, task: &str) {
        let mut counts = self.0.lock().unwrap_or_else(|e| e.into_inner());
        *counts.entry(task.to_string()).or_default() += 1;
    }
}

// ---------------------------------------------------------------------------
// Behaviors
// ---------------------------------------------------------------------------

struct Wander(SharedWorld);

impl TaskBehavior for Wander {
    fn calculate_priority(&mut self, _task: &Task) -> f32 {
        10.0
    }

    fn on_begin(&mut self, ctx: &mut TaskContext<'_>, _args: &InvokeArgs) {
        let destination = {
            let mut world = lock(&self.0);
            let here = world.position;
            let dx = world.rng.gen_range(-8.0_f32..8.0);
            let dy = world.rng.gen_range(-8.0_f32..8.0);
            Location::new(here.x + dx, here.y + dy, here.z)
        };
        ctx.trace("stretching legs");
        if ctx
            .invoke("move_to", InvokeArgs::to_location(destination).with_instruction("walk"))
            .is_err()
        {
            ctx.end(false);
        }
    }

    fn on_invoked_task_completed(&mut self, ctx: &mut TaskContext<'_>, success: bool) {
        ctx.end(success);
    }
}

struct Eat(SharedWorld);

impl TaskBehavior for Eat {
    fn calculate_priority(&mut self, _task: &Task) -> f32 {
        let world = lock(&self.0);
        if world.food.is_empty() { 0.0 } else { world.hunger }
    }

    fn on_begin(&mut self, ctx: &mut TaskContext<'_>, _args: &InvokeArgs) {
        let food = lock(&self.0).nearest_food();
        let Some(food) = food else {
            ctx.end(false);
            return;
        };
        if ctx
            .invoke("move_to", InvokeArgs::to_location(food).with_instruction("walk"))
            .is_err()
        {
            ctx.end(false);
        }
    }

    fn on_invoked_task_completed(&mut self, ctx: &mut TaskContext<'_>, success: bool) {
        if success {
            lock(&self.0).hunger = 0.0;
            ctx.trace("ate");
        }
        ctx.end(success);
    }
}

struct Flee(SharedWorld);

impl TaskBehavior for Flee {
    fn calculate_priority(&mut self, _task: &Task) -> f32 {
        match lock(&self.0).threat_distance() {
            Some(d) if d < THREAT_RADIUS => 200.0 + (THREAT_RADIUS - d),
            _ => 0.0,
        }
    }

    fn on_begin(&mut self, ctx: &mut TaskContext<'_>, _args: &InvokeArgs) {
        let (position, threat) = {
            let world = lock(&self.0);
            (world.position, world.threat.as_ref().map(|t| t.location))
        };
        let Some(threat) = threat else {
            ctx.end(true);
            return;
        };
        let destination = {
            let (dx, dy) = (position.x - threat.x, position.y - threat.y);
            let len = (dx * dx + dy * dy).sqrt().max(f32::EPSILON);
            let run = THREAT_RADIUS * 1.5;
            Location::new(position.x + dx / len * run, position.y + dy / len * run, position.z)
        };
        ctx.trace("running away");
        if ctx
            .invoke("move_to", InvokeArgs::to_location(destination).with_instruction("run"))
            .is_err()
        {
            ctx.end(false);
        }
    }

    fn on_invoked_task_completed(&mut self, ctx: &mut TaskContext<'_>, success: bool) {
        ctx.end(success);
    }

    fn on_perception(&mut self, ctx: &mut TaskContext<'_>, source: EntityRef, stimulus: &Stimulus) {
        if stimulus.sensed {
            ctx.trace(format!("spotted {source} ({})", stimulus.sense));
        }
    }
}

struct MoveTo(SharedWorld);

impl TaskBehavior for MoveTo {
    fn on_begin(&mut self, ctx: &mut TaskContext<'_>, args: &InvokeArgs) {
        let Some(destination) = args.target_location else {
            ctx.end(false);
            return;
        };
        // Guard the walk as strongly as whoever asked for it.
        if let Some(parent) = ctx.task().parent() {
            if let Some(p) = ctx.scheduler().task(parent) {
                let inherited = p.interrupt_type();
                ctx.set_interrupt_type(inherited);
            }
        }
        let speed = if args.instruction == "run" { RUN_SPEED } else { WALK_SPEED };
        let distance = {
            let mut world = lock(&self.0);
            world.order = Some(MoveOrder { destination, speed });
            world.position.distance(&destination)
        };
        let budget = Duration::try_from_secs_f32(distance / speed + 2.0).unwrap_or(Duration::MAX);
        ctx.wait(budget, None);
    }

    fn on_custom_trigger(
        &mut self,
        ctx: &mut TaskContext<'_>,
        trigger: &TriggerId,
        _payload: Option<&serde_json::Value>,
    ) {
        if trigger.as_str() != ARRIVED || !ctx.task().is_waiting() {
            return;
        }
        let current = ctx.task().interrupt_type();
        if ctx.done_waiting(current) == DoneWaiting::Continue {
            ctx.end(true);
        }
    }

    fn on_end(&mut self, _ctx: &mut TaskContext<'_>, outcome: TaskOutcome) {
        if !outcome.success {
            lock(&self.0).order = None;
        }
    }
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// A seeded, fixed-step run of the demo agent.
pub struct Simulation {
    clock: ManualClock,
    world: SharedWorld,
    scheduler: Scheduler,
    entries: EntryCounter,
    dt: Duration,
    ticks: u64,
}

impl Simulation {
    /// Build the demo agent. Task settings come from `config.tasks` where a
    /// kind is listed there, else from [`default_tasks`].
    pub fn new(
        config: &SchedulerConfig,
        seed: u64,
        dt: Duration,
        sink: Arc<dyn TraceSink>,
    ) -> SchedResult<Self> {
        config.validate()?;
        let clock = ManualClock::new();
        let world: SharedWorld = Arc::new(Mutex::new(World::new(seed)));
        let mut scheduler = Scheduler::new(config.clone(), Arc::new(clock.clone()));

        for listed in &config.tasks {
            if !default_tasks().iter().any(|t| t.kind == listed.kind) {
                tracing::warn!(task = %listed.kind, "no demo behavior for task kind, skipping");
            }
        }
        for default in default_tasks() {
            let task_config = config
                .tasks
                .iter()
                .find(|t| t.kind == default.kind)
                .cloned()
                .unwrap_or(default);
            let behavior: Box<dyn TaskBehavior> = match task_config.kind.as_str() {
                "wander" => Box::new(Wander(world.clone())),
                "eat" => Box::new(Eat(world.clone())),
                "flee" => Box::new(Flee(world.clone())),
                _ => Box::new(MoveTo(world.clone())),
            };
            scheduler.register(task_config, behavior)?;
        }

        let entries = EntryCounter::default();
        scheduler.add_observer(Box::new(entries.clone()));
        scheduler.initialize(
            AgentLink::new("deer")
                .with_movement(Box::new(WorldMovement(world.clone())))
                .with_sink(sink),
        )?;

        Ok(Self {
            clock,
            world,
            scheduler,
            entries,
            dt,
            ticks: 0,
        })
    }

    /// Advance the world by one step and run one scheduler cycle.
    pub fn step(&mut self) {
        self.clock.advance(self.dt);
        self.ticks += 1;
        let now = self.clock.now();

        let (arrived, spotted, lost) = {
            let mut world = lock(&self.world);
            let arrived = world.advance(self.dt.as_secs_f32());

            let mut spotted = None;
            let mut lost = None;
            match world.threat.as_ref().map(|t| (t.location, t.leaves_at)) {
                Some((location, leaves_at)) if now >= leaves_at => {
                    lost = Some(location);
                    world.threat = None;
                }
                Some(_) => {}
                None => {
                    let chance = (THREAT_CHANCE_PER_SEC * self.dt.as_secs_f64()).clamp(0.0, 1.0);
                    if world.rng.gen_bool(chance) {
                        let here = world.position;
                        let location = Location::new(
                            here.x + world.rng.gen_range(-15.0_f32..15.0),
                            here.y + world.rng.gen_range(-15.0_f32..15.0),
                            0.0,
                        );
                        world.threat = Some(Threat {
                            location,
                            leaves_at: now + Duration::from_secs_f64(THREAT_STAY_SECS),
                        });
                        let strength = THREAT_RADIUS - location.distance(&here);
                        spotted = Some((location, strength));
                    }
                }
            }
            (arrived, spotted, lost)
        };

        if let Some((location, strength)) = spotted {
            self.scheduler
                .on_sensory_event(PREDATOR, &Stimulus::sighted(location, strength));
        }
        if let Some(location) = lost {
            self.scheduler
                .on_sensory_event(PREDATOR, &Stimulus::lost("sight", location));
        }
        if arrived {
            // `move_to` is always registered by `new`.
            let _ = self
                .scheduler
                .on_custom_trigger(Some("move_to"), &TriggerId::new(ARRIVED), None);
        }

        self.scheduler.update_active_tasks();
    }

    /// Run `ticks` steps.
    pub fn run(&mut self, ticks: u64) {
        for _ in 0..ticks {
            self.step();
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn world(&self) -> SharedWorld {
        self.world.clone()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// How often each task gained control so far.
    pub fn entries(&self) -> BTreeMap<String, usize> {
        self.entries
            .0
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        self.scheduler.snapshot()
    }
}
