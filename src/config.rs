//! Scheduler configuration, persisted as TOML.
//!
//! Durations are stored as fractional seconds (`*_secs`) so config files stay
//! readable; accessors convert them to [`Duration`].

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{SchedResult, SchedulerError};
use crate::interrupt::{InterruptMargins, InterruptType};

/// Convert fractional seconds to a `Duration`. Negative and NaN input is
/// zero; anything too large for a `Duration` saturates to `Duration::MAX`.
pub fn secs_to_duration(secs: f64) -> Duration {
    if secs.is_nan() || secs <= 0.0 {
        Duration::ZERO
    } else {
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Whether `secs` is a non-negative number of seconds a `Duration` can hold.
fn is_duration_secs(secs: f64) -> bool {
    secs >= 0.0 && Duration::try_from_secs_f64(secs).is_ok()
}

// ---------------------------------------------------------------------------
// Loop guard
// ---------------------------------------------------------------------------

/// Runaway-restart detection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopGuardConfig {
    /// Width of the detection window in seconds (default: 1.0).
    pub window_secs: f64,
    /// Starts within one window that trip the guard (default: 25).
    pub max_starts: u32,
    /// Cooldown installed on a tripped task and its ancestors (default: 1.0).
    pub penalty_cooldown_secs: f64,
}

impl Default for LoopGuardConfig {
    fn default() -> Self {
        Self {
            window_secs: 1.0,
            max_starts: 25,
            penalty_cooldown_secs: 1.0,
        }
    }
}

impl LoopGuardConfig {
    pub fn window(&self) -> Duration {
        secs_to_duration(self.window_secs)
    }

    pub fn penalty_cooldown(&self) -> Duration {
        secs_to_duration(self.penalty_cooldown_secs)
    }
}

// ---------------------------------------------------------------------------
// Declarative task setup
// ---------------------------------------------------------------------------

/// Static configuration of one task, applied at registration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Kind identifier, unique per agent.
    pub kind: String,
    /// Whether the task takes part in top-level ranking.
    #[serde(default)]
    pub primary: bool,
    /// Minimum seconds between successive starts.
    #[serde(default)]
    pub cooldown_secs: f64,
    /// Interrupt type the task starts with and returns to after ending.
    #[serde(default)]
    pub interrupt: InterruptType,
    /// Disabled tasks are skipped by ranking and event fan-out.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl TaskConfig {
    /// A primary task with no cooldown that can always be interrupted.
    pub fn primary(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            primary: true,
            cooldown_secs: 0.0,
            interrupt: InterruptType::Always,
            enabled: true,
        }
    }

    /// A task reachable only through invocation.
    pub fn invoked(kind: impl Into<String>) -> Self {
        Self {
            primary: false,
            ..Self::primary(kind)
        }
    }

    pub fn with_cooldown_secs(mut self, secs: f64) -> Self {
        self.cooldown_secs = secs;
        self
    }

    pub fn with_interrupt(mut self, interrupt: InterruptType) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// Cooldown as a `Duration`; negative values clamp to zero.
    pub fn cooldown(&self) -> Duration {
        secs_to_duration(self.cooldown_secs)
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Configuration for a [`Scheduler`](crate::scheduler::Scheduler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Whether evaluation runs at all (default: true).
    pub enabled: bool,
    /// A candidate must score strictly above this to be selected (default: 0.0).
    pub selection_floor: f32,
    /// Entries kept by the in-memory thought log (default: 30).
    pub thought_capacity: usize,
    /// Interruption margin table.
    pub margins: InterruptMargins,
    /// Runaway-restart detection.
    pub loop_guard: LoopGuardConfig,
    /// Optional declarative task list, used by the simulation CLI.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskConfig>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            selection_floor: 0.0,
            thought_capacity: 30,
            margins: InterruptMargins::default(),
            loop_guard: LoopGuardConfig::default(),
            tasks: Vec::new(),
        }
    }
}

impl SchedulerConfig {
    /// Parse from a TOML string and validate.
    pub fn from_toml_str(content: &str, origin: &str) -> SchedResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| SchedulerError::ConfigParse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> SchedResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SchedulerError::ConfigRead {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    /// Save to a TOML file, creating parent directories as needed.
    pub fn save(&self, path: &Path) -> SchedResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| SchedulerError::ConfigSerialize {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| SchedulerError::ConfigWrite {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| SchedulerError::ConfigWrite {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Check value ranges.
    pub fn validate(&self) -> SchedResult<()> {
        if !self.selection_floor.is_finite() {
            return Err(invalid("selection_floor", "must be finite"));
        }
        for (name, value) in self.margins.entries() {
            if !value.is_finite() || value < 0.0 {
                return Err(invalid(
                    &format!("margins.{name}"),
                    "must be finite and non-negative",
                ));
            }
        }
        let guard = &self.loop_guard;
        if !is_duration_secs(guard.window_secs) || guard.window_secs <= 0.0 {
            return Err(invalid(
                "loop_guard.window_secs",
                "must be positive and representable as a duration",
            ));
        }
        if guard.max_starts == 0 {
            return Err(invalid("loop_guard.max_starts", "must be at least 1"));
        }
        if !is_duration_secs(guard.penalty_cooldown_secs) {
            return Err(invalid(
                "loop_guard.penalty_cooldown_secs",
                "must be non-negative and representable as a duration",
            ));
        }
        for task in &self.tasks {
            if task.kind.trim().is_empty() {
                return Err(invalid("tasks.kind", "must not be empty"));
            }
            // Negative cooldowns clamp to zero.
            if !task.cooldown_secs.is_finite() || !is_duration_secs(task.cooldown_secs.max(0.0)) {
                return Err(invalid(
                    &format!("tasks.{}.cooldown_secs", task.kind),
                    "must be finite and representable as a duration",
                ));
            }
        }
        Ok(())
    }
}

fn invalid(field: &str, message: &str) -> SchedulerError {
    SchedulerError::InvalidConfig {
        field: field.into(),
        message: message.into(),
    }
}
