//! Behavior compilation: raw specs to per-type tick functions.
//!
//! A behavior goes through two stages. [`BehaviorKind::parse`] validates the
//! raw editor spec into a typed descriptor, then [`compile_behavior`] turns
//! the descriptor into an [`UpdateStep`] closure with its target types
//! resolved to compiled indices. Parameter references stay symbolic and are
//! read from the environment's parameter table on every invocation.

mod kind;
mod steps;

pub use kind::{
    Action, BehaviorKind, Condition, DEFAULT_AMOUNT, DEFAULT_COLLISION_RADIUS,
    DEFAULT_FLOCK_RADIUS, DEFAULT_PROBABILITY, DEFAULT_SPEED, DEFAULT_STRENGTH,
    DEFAULT_THRESHOLD, DEFAULT_WIGGLE_ANGLE,
};
pub use steps::REPRODUCE_OFFSET;

use crate::bounds::Bounds;
use crate::environment::Environment;
use crate::error::CompileError;
use crate::model::AgentType;
use crate::params::NumberInput;
use std::collections::HashMap;
use tracing::debug;

/// Whether the rest of an agent's pipeline runs this tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepFlow {
    Continue,
    /// The agent was removed (or otherwise finished); skip remaining steps
    Halt,
}

/// One compiled behavior.
pub type UpdateStep = Box<dyn Fn(&mut Environment, usize) -> StepFlow + Send + Sync>;

/// What happens to an agent that ends its update outside the world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryPolicy {
    /// Reflect position and velocity (an enabled `bounce` behavior)
    Bounce,
    /// Toroidal wrap
    Wrap,
    /// Clamp onto the edge
    Clamp,
}

impl BoundaryPolicy {
    /// Picks the policy for a pipeline; an explicit `bounce` wins over wrap.
    pub fn select(kinds: &[BehaviorKind], bounds: Bounds) -> Self {
        if kinds.iter().any(|k| matches!(k, BehaviorKind::Bounce)) {
            BoundaryPolicy::Bounce
        } else if bounds.wraparound {
            BoundaryPolicy::Wrap
        } else {
            BoundaryPolicy::Clamp
        }
    }

    pub fn apply(&self, env: &mut Environment, slot: usize) {
        let bounds = env.bounds();
        match self {
            BoundaryPolicy::Bounce => {
                steps::bounce(env, slot);
            }
            BoundaryPolicy::Wrap | BoundaryPolicy::Clamp => {
                if let Some(agent) = env.agent_mut(slot) {
                    agent.position = if *self == BoundaryPolicy::Wrap {
                        bounds.wrap(agent.position)
                    } else {
                        bounds.clamp(agent.position)
                    };
                }
            }
        }
    }
}

/// The ordered update pipeline of one agent type.
pub struct TickFunction {
    type_index: usize,
    steps: Vec<UpdateStep>,
    kinds: Vec<&'static str>,
    boundary: BoundaryPolicy,
    initial_speed: Option<NumberInput>,
}

impl std::fmt::Debug for TickFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickFunction")
            .field("type_index", &self.type_index)
            .field("steps", &self.kinds)
            .field("boundary", &self.boundary)
            .field("initial_speed", &self.initial_speed)
            .finish()
    }
}

impl TickFunction {
    /// Runs the pipeline for the agent in `slot`, then applies the boundary
    /// policy. Stops early once the agent is removed.
    pub fn run(&self, env: &mut Environment, slot: usize) {
        for step in &self.steps {
            if !env.is_alive(slot) {
                return;
            }
            if step(env, slot) == StepFlow::Halt {
                break;
            }
        }
        if env.is_alive(slot) {
            self.boundary.apply(env, slot);
        }
    }

    /// Behavior kind names in pipeline order.
    pub fn step_names(&self) -> &[&'static str] {
        &self.kinds
    }

    /// Speed given to freshly set-up agents, if the pipeline moves them.
    ///
    /// Taken from the first movement behavior that has a speed; flocking-only
    /// pipelines use [`DEFAULT_SPEED`].
    pub fn initial_speed(&self) -> Option<&NumberInput> {
        self.initial_speed.as_ref()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

/// Resolves agent-type references (by id, then by name) to compiled indices.
#[derive(Debug, Clone, Default)]
pub struct TypeResolver {
    by_id: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

impl TypeResolver {
    pub fn new(types: &[AgentType]) -> Self {
        let mut resolver = Self::default();
        for (index, ty) in types.iter().enumerate() {
            resolver.by_id.entry(ty.id.clone()).or_insert(index);
            resolver.by_name.entry(ty.name.clone()).or_insert(index);
        }
        resolver
    }

    pub fn resolve(&self, reference: &str) -> Option<usize> {
        self.by_id
            .get(reference)
            .or_else(|| self.by_name.get(reference))
            .copied()
    }
}

/// Compiles one parsed behavior into a step closure.
pub fn compile_behavior(
    kind: BehaviorKind,
    agent_type: &str,
    types: &TypeResolver,
) -> Result<UpdateStep, CompileError> {
    let target = match kind.target() {
        Some(reference) => Some(types.resolve(reference).ok_or_else(|| {
            CompileError::DanglingTarget {
                agent_type: agent_type.to_string(),
                behavior: kind.name().to_string(),
                target: reference.to_string(),
            }
        })?),
        None => None,
    };
    // Only targeted kinds read `target`
    let target = target.unwrap_or_default();

    let step: UpdateStep = match kind {
        BehaviorKind::RandomWalk { speed } => {
            Box::new(move |env: &mut Environment, slot: usize| steps::random_walk(env, slot, &speed))
        }
        BehaviorKind::MoveForward { speed } => {
            Box::new(move |env: &mut Environment, slot: usize| steps::move_forward(env, slot, &speed))
        }
        BehaviorKind::MoveToward { speed, .. } => {
            Box::new(move |env: &mut Environment, slot: usize| steps::move_relative(env, slot, target, &speed, false))
        }
        BehaviorKind::MoveAway { speed, .. } => {
            Box::new(move |env: &mut Environment, slot: usize| steps::move_relative(env, slot, target, &speed, true))
        }
        BehaviorKind::Separate { radius, strength } => {
            Box::new(move |env: &mut Environment, slot: usize| steps::separate(env, slot, &radius, &strength))
        }
        BehaviorKind::Align { radius, strength } => {
            Box::new(move |env: &mut Environment, slot: usize| steps::align(env, slot, &radius, &strength))
        }
        BehaviorKind::Cohere { radius, strength } => {
            Box::new(move |env: &mut Environment, slot: usize| steps::cohere(env, slot, &radius, &strength))
        }
        BehaviorKind::Wiggle { angle } => Box::new(move |env: &mut Environment, slot: usize| steps::wiggle(env, slot, &angle)),
        BehaviorKind::Bounce => Box::new(steps::bounce),
        BehaviorKind::Die { probability } => {
            Box::new(move |env: &mut Environment, slot: usize| steps::die(env, slot, &probability))
        }
        BehaviorKind::Reproduce { probability } => {
            Box::new(move |env: &mut Environment, slot: usize| steps::reproduce(env, slot, &probability))
        }
        BehaviorKind::OnCollision { radius, action, .. } => {
            Box::new(move |env: &mut Environment, slot: usize| steps::on_collision(env, slot, target, &radius, &action))
        }
        BehaviorKind::OnProperty {
            property,
            condition,
            threshold,
            action,
        } => Box::new(move |env: &mut Environment, slot: usize| {
            steps::on_property(env, slot, &property, condition, &threshold, &action)
        }),
        BehaviorKind::IncrementProperty { property, amount } => {
            Box::new(move |env: &mut Environment, slot: usize| steps::increment_property(env, slot, &property, &amount))
        }
    };
    Ok(step)
}

/// Parses every enabled behavior of an agent type, in declaration order.
pub fn parse_behaviors(agent_type: &AgentType) -> Result<Vec<BehaviorKind>, CompileError> {
    agent_type
        .behaviors
        .iter()
        .filter(|spec| spec.enabled)
        .map(|spec| BehaviorKind::parse(spec, &agent_type.id))
        .collect()
}

/// Builds the tick function of one agent type.
pub fn compile_pipeline(
    agent_type: &AgentType,
    type_index: usize,
    types: &TypeResolver,
    bounds: Bounds,
) -> Result<TickFunction, CompileError> {
    let parsed = parse_behaviors(agent_type)?;
    let boundary = BoundaryPolicy::select(&parsed, bounds);
    let kinds = parsed.iter().map(BehaviorKind::name).collect::<Vec<_>>();
    let initial_speed = parsed.iter().any(BehaviorKind::is_motion).then(|| {
        parsed
            .iter()
            .find_map(BehaviorKind::speed)
            .cloned()
            .unwrap_or_else(|| NumberInput::literal(DEFAULT_SPEED))
    });

    let steps = parsed
        .into_iter()
        .map(|kind| compile_behavior(kind, &agent_type.id, types))
        .collect::<Result<Vec<_>, _>>()?;

    debug!(
        "Compiled '{}': {} steps, boundary {:?}",
        agent_type.id,
        steps.len(),
        boundary
    );

    Ok(TickFunction {
        type_index,
        steps,
        kinds,
        boundary,
        initial_speed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::model::BehaviorSpec;
    use crate::params::ParameterTable;
    use nalgebra::Vector2;

    fn types() -> Vec<AgentType> {
        vec![AgentType::new("sheep"), AgentType::new("wolf")]
    }

    fn env(wrap: bool) -> Environment {
        Environment::new(
            Bounds::new(100.0, 100.0, wrap),
            ParameterTable::new(),
            vec!["sheep".into(), "wolf".into()],
            3,
        )
    }

    #[test]
    fn test_disabled_behaviors_are_skipped() {
        let ty = AgentType::new("sheep")
            .with_behavior(BehaviorSpec::new("random-walk"))
            .with_behavior(BehaviorSpec::new("teleport").disabled());
        let tick = compile_pipeline(&ty, 0, &TypeResolver::new(&types()), Bounds::new(1.0, 1.0, false))
            .unwrap();
        assert_eq!(tick.step_names(), &["random-walk"]);
        assert_eq!(tick.initial_speed(), Some(&NumberInput::literal(DEFAULT_SPEED)));
    }

    #[test]
    fn test_static_pipeline_has_no_initial_speed() {
        let ty = AgentType::new("grass").with_behavior(BehaviorSpec::new("increment-property").param("property", "age"));
        let tick = compile_pipeline(&ty, 0, &TypeResolver::new(&types()), Bounds::new(1.0, 1.0, false))
            .unwrap();
        assert!(tick.initial_speed().is_none());
    }

    #[test]
    fn test_dangling_target_is_error() {
        let ty = AgentType::new("wolf").with_behavior(BehaviorSpec::new("move-toward").param("target", "goat"));
        let err = compile_pipeline(&ty, 1, &TypeResolver::new(&types()), Bounds::new(1.0, 1.0, false))
            .unwrap_err();
        assert!(matches!(err, CompileError::DanglingTarget { ref target, .. } if target == "goat"));
    }

    #[test]
    fn test_target_resolves_by_name() {
        let mut tys = types();
        tys[0].name = "Sheep".into();
        let resolver = TypeResolver::new(&tys);
        assert_eq!(resolver.resolve("sheep"), Some(0));
        assert_eq!(resolver.resolve("Sheep"), Some(0));
        assert_eq!(resolver.resolve("goat"), None);
    }

    #[test]
    fn test_boundary_selection() {
        let wrap = Bounds::new(1.0, 1.0, true);
        let plain = Bounds::new(1.0, 1.0, false);
        assert_eq!(BoundaryPolicy::select(&[], wrap), BoundaryPolicy::Wrap);
        assert_eq!(BoundaryPolicy::select(&[], plain), BoundaryPolicy::Clamp);
        assert_eq!(BoundaryPolicy::select(&[BehaviorKind::Bounce], wrap), BoundaryPolicy::Bounce);
    }

    #[test]
    fn test_pipeline_halts_after_removal() {
        let ty = AgentType::new("sheep")
            .with_behavior(BehaviorSpec::new("die").param("probability", 1.0))
            .with_behavior(BehaviorSpec::new("increment-property").param("property", "age"));
        let tick = compile_pipeline(&ty, 0, &TypeResolver::new(&types()), Bounds::new(100.0, 100.0, false))
            .unwrap();

        let mut env = env(false);
        let id = env.allocate_id();
        env.insert(Agent::new(id, 0, Vector2::new(5.0, 5.0)));
        tick.run(&mut env, 0);

        assert!(!env.is_alive(0));
        assert_eq!(env.agent(0).unwrap().properties.number("age"), None);
    }

    #[test]
    fn test_wrap_applied_after_steps() {
        let ty = AgentType::new("sheep").with_behavior(BehaviorSpec::new("move-forward").param("speed", 3.0));
        let tick = compile_pipeline(&ty, 0, &TypeResolver::new(&types()), Bounds::new(100.0, 100.0, true))
            .unwrap();

        let mut env = env(true);
        let id = env.allocate_id();
        let mut agent = Agent::new(id, 0, Vector2::new(99.0, 50.0));
        agent.set_velocity(Vector2::new(1.0, 0.0));
        env.insert(agent);
        tick.run(&mut env, 0);

        approx::assert_relative_eq!(env.agent(0).unwrap().position.x, 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_parameter_reference_is_read_live() {
        let ty = AgentType::new("sheep").with_behavior(BehaviorSpec::new("move-forward").param("speed", "$speed"));
        let tick = compile_pipeline(&ty, 0, &TypeResolver::new(&types()), Bounds::new(100.0, 100.0, false))
            .unwrap();

        let mut env = env(false);
        env.params_mut().set("speed", crate::value::Value::Number(2.0));
        let id = env.allocate_id();
        let mut agent = Agent::new(id, 0, Vector2::new(10.0, 10.0));
        agent.set_velocity(Vector2::new(1.0, 0.0));
        env.insert(agent);

        tick.run(&mut env, 0);
        approx::assert_relative_eq!(env.agent(0).unwrap().position.x, 12.0);

        env.params_mut().set("speed", crate::value::Value::Number(5.0));
        tick.run(&mut env, 0);
        approx::assert_relative_eq!(env.agent(0).unwrap().position.x, 17.0);
    }
}
