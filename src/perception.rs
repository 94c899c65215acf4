//! Perception payloads forwarded to tasks.
//!
//! The scheduler does not produce or interpret stimuli; it only fans them out
//! to every enabled task's [`on_perception`](crate::task::TaskBehavior::on_perception)
//! hook.

use serde::{Deserialize, Serialize};

/// Opaque reference to a world entity (an actor, an item, a spot).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef(pub u64);

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "entity:{}", self.0)
    }
}

/// A point in world space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Location {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Location) -> f32 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// One sensed stimulus about an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stimulus {
    /// Which sense produced it ("sight", "hearing", ...).
    pub sense: String,
    /// Sense-specific strength, larger is stronger.
    pub strength: f32,
    /// Where the stimulus originated.
    pub location: Location,
    /// `false` when the entity dropped out of perception.
    pub sensed: bool,
}

impl Stimulus {
    pub fn sighted(location: Location, strength: f32) -> Self {
        Self {
            sense: "sight".into(),
            strength,
            location,
            sensed: true,
        }
    }

    pub fn lost(sense: impl Into<String>, location: Location) -> Self {
        Self {
            sense: sense.into(),
            strength: 0.0,
            location,
            sensed: false,
        }
    }
}
