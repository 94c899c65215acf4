//! Interruption policy: how hard it is to preempt the running task.
//!
//! Every task carries an [`InterruptType`]. When the scheduler finds a better
//! candidate than the active task, it looks up the *active* task's type in the
//! [`InterruptMargins`] table and preempts only if the candidate's priority
//! exceeds the active one by strictly more than the configured margin.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Interrupt types
// ---------------------------------------------------------------------------

/// Sensitivity of a task to preemption, from least to most protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptType {
    /// Yields to any strictly better candidate.
    #[default]
    Always,
    /// Yields to a moderately better candidate.
    WaitASec,
    PreferablyNot,
    OnlyIfNeeded,
    IfPanic,
    IfLifeOrDeath,
    /// Never yields, whatever the candidate's priority.
    Never,
}

impl InterruptType {
    /// All interrupt types in ascending order of protection.
    pub const ALL: [InterruptType; 7] = [
        InterruptType::Always,
        InterruptType::WaitASec,
        InterruptType::PreferablyNot,
        InterruptType::OnlyIfNeeded,
        InterruptType::IfPanic,
        InterruptType::IfLifeOrDeath,
        InterruptType::Never,
    ];

    /// Stable label, matching the serialized form.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::WaitASec => "wait_a_sec",
            Self::PreferablyNot => "preferably_not",
            Self::OnlyIfNeeded => "only_if_needed",
            Self::IfPanic => "if_panic",
            Self::IfLifeOrDeath => "if_life_or_death",
            Self::Never => "never",
        }
    }
}

impl std::fmt::Display for InterruptType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

impl FromStr for InterruptType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.label() == normalized)
            .ok_or_else(|| format!("unknown interrupt type: {s}"))
    }
}

// ---------------------------------------------------------------------------
// Margin table
// ---------------------------------------------------------------------------

/// Required priority margin (candidate − active) per interrupt type.
///
/// `Never` has no entry: it is never interrupted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterruptMargins {
    /// Negligible epsilon for `Always`.
    pub always: f32,
    pub wait_a_sec: f32,
    pub preferably_not: f32,
    pub only_if_needed: f32,
    pub if_panic: f32,
    pub if_life_or_death: f32,
}

impl Default for InterruptMargins {
    fn default() -> Self {
        Self {
            always: f32::EPSILON,
            wait_a_sec: 10.0,
            preferably_not: 25.0,
            only_if_needed: 45.0,
            if_panic: 95.0,
            if_life_or_death: 250.0,
        }
    }
}

impl InterruptMargins {
    /// Margin a candidate must strictly exceed to preempt a task of this type.
    ///
    /// Returns `None` for [`InterruptType::Never`].
    pub fn required_margin(&self, interrupt_type: InterruptType) -> Option<f32> {
        match interrupt_type {
            InterruptType::Always => Some(self.always),
            InterruptType::WaitASec => Some(self.wait_a_sec),
            InterruptType::PreferablyNot => Some(self.preferably_not),
            InterruptType::OnlyIfNeeded => Some(self.only_if_needed),
            InterruptType::IfPanic => Some(self.if_panic),
            InterruptType::IfLifeOrDeath => Some(self.if_life_or_death),
            InterruptType::Never => None,
        }
    }

    /// Whether a candidate with `candidate_priority` should preempt an active
    /// task of type `active_type` running at `active_priority`.
    pub fn should_interrupt(
        &self,
        active_type: InterruptType,
        active_priority: f32,
        candidate_priority: f32,
    ) -> bool {
        match self.required_margin(active_type) {
            Some(margin) => candidate_priority - active_priority > margin,
            None => false,
        }
    }

    /// Iterate `(field, value)` pairs, used by config validation.
    pub(crate) fn entries(&self) -> [(&'static str, f32); 6] {
        [
            ("always", self.always),
            ("wait_a_sec", self.wait_a_sec),
            ("preferably_not", self.preferably_not),
            ("only_if_needed", self.only_if_needed),
            ("if_panic", self.if_panic),
            ("if_life_or_death", self.if_life_or_death),
        ]
    }
}
