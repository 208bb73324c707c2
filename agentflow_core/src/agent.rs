//! Runtime agents and their render snapshots.

use crate::properties::PropertyBag;
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Stable agent identifier: assigned at creation, increasing, never reused
/// within one environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub u64);

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One simulated entity.
///
/// Agents are owned by the [`Environment`](crate::environment::Environment).
/// `type_index` points at the compiled agent type (and therefore at its tick
/// function); it is a back-reference, not ownership.
#[derive(Debug, Clone)]
pub struct Agent {
    pub id: AgentId,

    /// Index of the agent type in the compiled model
    pub type_index: usize,

    /// Position in world units
    pub position: Vector2<f64>,

    /// Velocity (displacement per tick for `move-forward`)
    pub velocity: Vector2<f64>,

    /// Heading in radians
    pub heading: f64,

    /// Custom properties
    pub properties: PropertyBag,

    /// Cleared when the agent is removed mid-tick
    pub(crate) alive: bool,
}

impl Agent {
    /// Creates a live, motionless agent.
    pub fn new(id: AgentId, type_index: usize, position: Vector2<f64>) -> Self {
        Self {
            id,
            type_index,
            position,
            velocity: Vector2::zeros(),
            heading: 0.0,
            properties: PropertyBag::new(),
            alive: true,
        }
    }

    /// Returns false once the agent has been removed.
    pub fn is_alive(&self) -> bool {
        self.alive
    }

    /// Sets velocity and derives the heading from it (if non-zero).
    pub fn set_velocity(&mut self, velocity: Vector2<f64>) {
        self.velocity = velocity;
        if velocity.norm_squared() > 0.0 {
            self.heading = velocity.y.atan2(velocity.x);
        }
    }
}

/// Renderable view of one agent, handed to tick observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSnapshot {
    pub id: u64,
    pub type_id: String,
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_set_velocity_updates_heading() {
        let mut agent = Agent::new(AgentId(1), 0, Vector2::new(1.0, 1.0));
        agent.set_velocity(Vector2::new(0.0, 2.0));
        assert_relative_eq!(agent.heading, std::f64::consts::FRAC_PI_2);

        agent.set_velocity(Vector2::zeros());
        assert_relative_eq!(agent.heading, std::f64::consts::FRAC_PI_2);
    }

    #[test]
    fn test_new_agent_is_alive() {
        let agent = Agent::new(AgentId(7), 2, Vector2::zeros());
        assert!(agent.is_alive());
        assert_eq!(agent.id.to_string(), "#7");
    }
}
