use serde::{Deserialize, Serialize};

use crate::perception::{EntityRef, Location};

/// Context passed to a task when it is started or invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvokeArgs {
    pub target: Option<EntityRef>,
    pub target_location: Option<Location>,
    /// Whether the task should keep trying until it succeeds (default: true).
    pub continue_until_success: bool,
    /// Free-form instruction for the task's own logic.
    pub instruction: String,
}

impl Default for InvokeArgs {
    fn default() -> Self {
        Self {
            target: None,
            target_location: None,
            continue_until_success: true,
            instruction: String::new(),
        }
    }
}

impl InvokeArgs {
    pub fn targeting(entity: EntityRef) -> Self {
        Self {
            target: Some(entity),
            ..Self::default()
        }
    }

    pub fn to_location(location: Location) -> Self {
        Self {
            target_location: Some(location),
            ..Self::default()
        }
    }

    pub fn with_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = instruction.into();
        self
    }

    pub fn once(mut self) -> Self {
        self.continue_until_success = false;
        self
    }
}
