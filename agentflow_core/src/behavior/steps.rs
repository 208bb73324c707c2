//! Step implementations for each behavior kind.
//!
//! Every function here operates on one agent slot of the environment. Flocking
//! and targeting read candidates through the spatial index and then re-check
//! the live agent (liveness and current distance), so moves and removals made
//! earlier in the same tick are visible.

use super::kind::{Action, Condition};
use super::StepFlow;
use crate::agent::Agent;
use crate::environment::Environment;
use crate::params::{NumberInput, ValueInput};
use crate::spatial::TypeFilter;
use crate::value::Value;
use nalgebra::{Rotation2, Vector2};
use rand::Rng;
use std::f64::consts::TAU;

/// Offset range (per axis) of a newborn around its parent.
pub const REPRODUCE_OFFSET: f64 = 5.0;

/// Weight applied to the alignment correction.
const ALIGN_FACTOR: f64 = 0.1;

/// Weight applied to the cohesion pull.
const COHERE_FACTOR: f64 = 0.01;

/// Snapshot-nearest candidates re-ranked by live distance when targeting.
const NEAREST_CANDIDATES: usize = 8;

pub(crate) fn random_walk(env: &mut Environment, slot: usize, speed: &NumberInput) -> StepFlow {
    let speed = speed.resolve(env.params());
    let angle = env.rng().gen_range(0.0..TAU);
    if let Some(agent) = env.agent_mut(slot) {
        let step = Vector2::new(angle.cos(), angle.sin()) * speed;
        agent.position += step;
        agent.velocity = step;
        agent.heading = angle;
    }
    StepFlow::Continue
}

pub(crate) fn move_forward(env: &mut Environment, slot: usize, speed: &NumberInput) -> StepFlow {
    let speed = speed.resolve(env.params());
    let Some(agent) = env.agent_mut(slot) else {
        return StepFlow::Continue;
    };
    let norm = agent.velocity.norm();
    if norm > 0.0 {
        let step = agent.velocity / norm * speed;
        agent.position += step;
        // A zero speed must not erase the direction of travel
        if speed > 0.0 {
            agent.set_velocity(step);
        }
    }
    StepFlow::Continue
}

/// Steps `speed` units toward (or away from) the nearest live agent of
/// `target`.
pub(crate) fn move_relative(
    env: &mut Environment,
    slot: usize,
    target: usize,
    speed: &NumberInput,
    away: bool,
) -> StepFlow {
    let speed = speed.resolve(env.params());
    let Some(agent) = env.agent(slot) else {
        return StepFlow::Continue;
    };
    let (id, position) = (agent.id, agent.position);
    let bounds = env.bounds();

    let target_at = env
        .index()
        .nearest_k(position, TypeFilter::Only(target), Some(id), NEAREST_CANDIDATES, |loc| {
            env.is_alive(loc.slot)
        })
        .into_iter()
        .filter_map(|n| env.agent(n.slot))
        .map(|other| (bounds.distance(position, other.position), other.id, other.position))
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(_, _, at)| at);
    let Some(target_at) = target_at else {
        return StepFlow::Continue;
    };

    let delta = bounds.delta(position, target_at);
    let dist = delta.norm();
    if dist == 0.0 {
        return StepFlow::Continue;
    }
    let dir = if away { -delta / dist } else { delta / dist };

    if let Some(agent) = env.agent_mut(slot) {
        agent.position += dir * speed;
        agent.heading = dir.y.atan2(dir.x);
    }
    StepFlow::Continue
}

/// Live same-type neighbors within `radius`: (offset to neighbor, velocity).
fn flock_neighbors(env: &Environment, slot: usize, radius: f64) -> Vec<(Vector2<f64>, Vector2<f64>)> {
    let Some(agent) = env.agent(slot) else {
        return Vec::new();
    };
    let bounds = env.bounds();
    env.index()
        .within_radius(
            agent.position,
            radius,
            TypeFilter::Only(agent.type_index),
            Some(agent.id),
        )
        .into_iter()
        .filter_map(|n| env.agent(n.slot).filter(|a| a.is_alive()))
        .map(|other| (bounds.delta(agent.position, other.position), other.velocity))
        .filter(|(delta, _)| delta.norm() <= radius)
        .collect()
}

fn nudge_velocity(env: &mut Environment, slot: usize, dv: Vector2<f64>) {
    if let Some(agent) = env.agent_mut(slot) {
        let v = agent.velocity + dv;
        agent.set_velocity(v);
    }
}

pub(crate) fn separate(
    env: &mut Environment,
    slot: usize,
    radius: &NumberInput,
    strength: &NumberInput,
) -> StepFlow {
    let (radius, strength) = (radius.resolve(env.params()), strength.resolve(env.params()));
    let neighbors = flock_neighbors(env, slot, radius);
    if neighbors.is_empty() {
        return StepFlow::Continue;
    }

    let mut push = Vector2::zeros();
    for (delta, _) in &neighbors {
        let dist = delta.norm();
        if dist > 0.0 {
            push -= delta / dist / dist;
        }
    }
    nudge_velocity(env, slot, push * strength);
    StepFlow::Continue
}

pub(crate) fn align(
    env: &mut Environment,
    slot: usize,
    radius: &NumberInput,
    strength: &NumberInput,
) -> StepFlow {
    let (radius, strength) = (radius.resolve(env.params()), strength.resolve(env.params()));
    let neighbors = flock_neighbors(env, slot, radius);
    if neighbors.is_empty() {
        return StepFlow::Continue;
    }

    let mean = neighbors.iter().map(|(_, v)| v).sum::<Vector2<f64>>() / neighbors.len() as f64;
    let Some(current) = env.agent(slot).map(|a| a.velocity) else {
        return StepFlow::Continue;
    };
    nudge_velocity(env, slot, (mean - current) * strength * ALIGN_FACTOR);
    StepFlow::Continue
}

pub(crate) fn cohere(
    env: &mut Environment,
    slot: usize,
    radius: &NumberInput,
    strength: &NumberInput,
) -> StepFlow {
    let (radius, strength) = (radius.resolve(env.params()), strength.resolve(env.params()));
    let neighbors = flock_neighbors(env, slot, radius);
    if neighbors.is_empty() {
        return StepFlow::Continue;
    }

    // Offset to the torus-aware center of mass
    let center = neighbors.iter().map(|(d, _)| d).sum::<Vector2<f64>>() / neighbors.len() as f64;
    nudge_velocity(env, slot, center * strength * COHERE_FACTOR);
    StepFlow::Continue
}

/// Perturbs heading (and velocity direction) by up to `angle` degrees.
pub(crate) fn wiggle(env: &mut Environment, slot: usize, angle: &NumberInput) -> StepFlow {
    let max = angle.resolve(env.params()).to_radians();
    if !(max > 0.0) {
        return StepFlow::Continue;
    }
    let offset = env.rng().gen_range(-max..=max);
    if let Some(agent) = env.agent_mut(slot) {
        agent.heading += offset;
        agent.velocity = Rotation2::new(offset) * agent.velocity;
    }
    StepFlow::Continue
}

pub(crate) fn bounce(env: &mut Environment, slot: usize) -> StepFlow {
    let bounds = env.bounds();
    if let Some(agent) = env.agent_mut(slot) {
        if !bounds.contains(agent.position) {
            let (position, velocity) = bounds.reflect(agent.position, agent.velocity);
            agent.position = position;
            agent.set_velocity(velocity);
        }
    }
    StepFlow::Continue
}

pub(crate) fn die(env: &mut Environment, slot: usize, probability: &NumberInput) -> StepFlow {
    let p = probability.resolve(env.params());
    if env.rng().gen::<f64>() < p {
        env.remove(slot);
        return StepFlow::Halt;
    }
    StepFlow::Continue
}

/// With probability `p`, queues a child near the parent.
///
/// The child copies type, velocity, heading and properties, and gets a fresh
/// id. It joins the world at the end of the tick.
pub(crate) fn reproduce(env: &mut Environment, slot: usize, probability: &NumberInput) -> StepFlow {
    let p = probability.resolve(env.params());
    if env.rng().gen::<f64>() >= p {
        return StepFlow::Continue;
    }
    let rng = env.rng();
    let offset = Vector2::new(
        rng.gen_range(-REPRODUCE_OFFSET..=REPRODUCE_OFFSET),
        rng.gen_range(-REPRODUCE_OFFSET..=REPRODUCE_OFFSET),
    );

    let bounds = env.bounds();
    let Some(parent) = env.agent(slot) else {
        return StepFlow::Continue;
    };
    let (type_index, position) = (parent.type_index, bounds.settle(parent.position + offset));
    let (velocity, heading, properties) = (parent.velocity, parent.heading, parent.properties.clone());

    let id = env.allocate_id();
    let mut child = Agent::new(id, type_index, position);
    child.velocity = velocity;
    child.heading = heading;
    child.properties = properties;
    env.queue_birth(child);
    StepFlow::Continue
}

pub(crate) fn on_collision(
    env: &mut Environment,
    slot: usize,
    target: usize,
    radius: &NumberInput,
    action: &Action,
) -> StepFlow {
    let radius = radius.resolve(env.params());
    let Some(agent) = env.agent(slot) else {
        return StepFlow::Continue;
    };
    let bounds = env.bounds();
    let hit = env
        .index()
        .within_radius(agent.position, radius, TypeFilter::Only(target), Some(agent.id))
        .into_iter()
        .find(|n| {
            env.agent(n.slot)
                .is_some_and(|other| {
                    other.is_alive() && bounds.distance(agent.position, other.position) <= radius
                })
        });

    match hit {
        Some(n) => apply_action(env, slot, Some(n.slot), action),
        None => StepFlow::Continue,
    }
}

pub(crate) fn on_property(
    env: &mut Environment,
    slot: usize,
    property: &str,
    condition: Condition,
    threshold: &ValueInput,
    action: &Action,
) -> StepFlow {
    let threshold = threshold.resolve(env.params());
    let Some(agent) = env.agent(slot) else {
        return StepFlow::Continue;
    };
    let current = agent
        .properties
        .get(property)
        .cloned()
        .unwrap_or(Value::Number(0.0));

    if condition.evaluate(&current, &threshold) {
        apply_action(env, slot, None, action)
    } else {
        StepFlow::Continue
    }
}

pub(crate) fn increment_property(
    env: &mut Environment,
    slot: usize,
    property: &str,
    amount: &NumberInput,
) -> StepFlow {
    let amount = amount.resolve(env.params());
    if let Some(agent) = env.agent_mut(slot) {
        agent.properties.increment(property, amount);
    }
    StepFlow::Continue
}

/// Runs an event action for the agent in `slot`.
///
/// `target` is the colliding agent for `on-collision`; `remove-target` is a
/// no-op without one.
pub(crate) fn apply_action(
    env: &mut Environment,
    slot: usize,
    target: Option<usize>,
    action: &Action,
) -> StepFlow {
    match action {
        Action::RemoveSelf => {
            env.remove(slot);
            StepFlow::Halt
        }
        Action::RemoveTarget => {
            if let Some(target) = target {
                env.remove(target);
            }
            StepFlow::Continue
        }
        Action::SetProperty { property, value } => {
            let value = value.resolve(env.params());
            if let Some(agent) = env.agent_mut(slot) {
                agent.properties.set(property, value);
            }
            StepFlow::Continue
        }
        Action::IncrementProperty { property, amount } => {
            increment_property(env, slot, property, amount)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::AgentId;
    use crate::bounds::Bounds;
    use crate::params::ParameterTable;
    use crate::value::ParamValue;
    use approx::assert_relative_eq;

    fn world(wrap: bool) -> Environment {
        Environment::new(
            Bounds::new(100.0, 100.0, wrap),
            ParameterTable::new(),
            vec!["sheep".into(), "wolf".into()],
            11,
        )
    }

    fn place(env: &mut Environment, type_index: usize, x: f64, y: f64) -> usize {
        let id = env.allocate_id();
        env.insert(Agent::new(id, type_index, Vector2::new(x, y)));
        env.slot_count() - 1
    }

    #[test]
    fn test_random_walk_moves_exactly_speed() {
        let mut env = world(false);
        let slot = place(&mut env, 0, 50.0, 50.0);
        random_walk(&mut env, slot, &NumberInput::literal(2.0));
        let agent = env.agent(slot).unwrap();
        let moved = (agent.position - Vector2::new(50.0, 50.0)).norm();
        assert_relative_eq!(moved, 2.0, epsilon = 1e-9);
        assert_relative_eq!(agent.velocity.norm(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_move_forward_normalizes_velocity() {
        let mut env = world(false);
        let slot = place(&mut env, 0, 10.0, 10.0);
        env.agent_mut(slot).unwrap().set_velocity(Vector2::new(3.0, 4.0));
        move_forward(&mut env, slot, &NumberInput::literal(1.0));
        let agent = env.agent(slot).unwrap();
        assert_relative_eq!(agent.position.x, 10.6, epsilon = 1e-9);
        assert_relative_eq!(agent.position.y, 10.8, epsilon = 1e-9);
    }

    #[test]
    fn test_move_toward_crosses_wrap_seam() {
        let mut env = world(true);
        let wolf = place(&mut env, 1, 98.0, 50.0);
        place(&mut env, 0, 2.0, 50.0);
        env.rebuild_index();

        move_relative(&mut env, wolf, 0, &NumberInput::literal(1.0), false);
        assert_relative_eq!(env.agent(wolf).unwrap().position.x, 99.0, epsilon = 1e-9);

        move_relative(&mut env, wolf, 0, &NumberInput::literal(1.0), true);
        assert_relative_eq!(env.agent(wolf).unwrap().position.x, 98.0, epsilon = 1e-9);
    }

    #[test]
    fn test_move_toward_skips_removed_target() {
        let mut env = world(false);
        let wolf = place(&mut env, 1, 50.0, 50.0);
        let near = place(&mut env, 0, 55.0, 50.0);
        place(&mut env, 0, 40.0, 50.0);
        env.rebuild_index();
        env.remove(near);

        move_relative(&mut env, wolf, 0, &NumberInput::literal(1.0), false);
        assert_relative_eq!(env.agent(wolf).unwrap().position.x, 49.0, epsilon = 1e-9);
    }

    #[test]
    fn test_move_toward_without_targets_is_noop() {
        let mut env = world(false);
        let wolf = place(&mut env, 1, 50.0, 50.0);
        env.rebuild_index();
        move_relative(&mut env, wolf, 0, &NumberInput::literal(1.0), false);
        assert_eq!(env.agent(wolf).unwrap().position, Vector2::new(50.0, 50.0));
    }

    #[test]
    fn test_separate_pushes_apart() {
        let mut env = world(false);
        let a = place(&mut env, 0, 50.0, 50.0);
        place(&mut env, 0, 52.0, 50.0);
        env.rebuild_index();

        separate(&mut env, a, &NumberInput::literal(25.0), &NumberInput::literal(1.0));
        let v = env.agent(a).unwrap().velocity;
        assert_relative_eq!(v.x, -0.5, epsilon = 1e-9);
        assert_relative_eq!(v.y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_align_and_cohere_with_no_neighbors_keep_velocity() {
        let mut env = world(false);
        let a = place(&mut env, 0, 50.0, 50.0);
        place(&mut env, 1, 51.0, 50.0);
        env.agent_mut(a).unwrap().set_velocity(Vector2::new(1.0, 0.0));
        env.rebuild_index();

        align(&mut env, a, &NumberInput::literal(25.0), &NumberInput::literal(1.0));
        cohere(&mut env, a, &NumberInput::literal(25.0), &NumberInput::literal(1.0));
        assert_eq!(env.agent(a).unwrap().velocity, Vector2::new(1.0, 0.0));
    }

    #[test]
    fn test_cohere_pulls_toward_center() {
        let mut env = world(false);
        let a = place(&mut env, 0, 50.0, 50.0);
        place(&mut env, 0, 60.0, 50.0);
        env.rebuild_index();

        cohere(&mut env, a, &NumberInput::literal(25.0), &NumberInput::literal(1.0));
        assert_relative_eq!(env.agent(a).unwrap().velocity.x, 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_wiggle_zero_angle_draws_nothing() {
        let mut a = world(false);
        let mut b = world(false);
        let sa = place(&mut a, 0, 1.0, 1.0);
        place(&mut b, 0, 1.0, 1.0);

        wiggle(&mut a, sa, &NumberInput::literal(0.0));
        assert_eq!(a.rng().gen::<u64>(), b.rng().gen::<u64>());
    }

    #[test]
    fn test_bounce_reflects() {
        let mut env = world(false);
        let slot = place(&mut env, 0, 101.0, 50.0);
        env.agent_mut(slot).unwrap().set_velocity(Vector2::new(2.0, 0.0));
        bounce(&mut env, slot);
        let agent = env.agent(slot).unwrap();
        assert_relative_eq!(agent.position.x, 99.0);
        assert!(agent.velocity.x < 0.0);
    }

    #[test]
    fn test_die_certain_and_never() {
        let mut env = world(false);
        let slot = place(&mut env, 0, 1.0, 1.0);
        assert_eq!(die(&mut env, slot, &NumberInput::literal(0.0)), StepFlow::Continue);
        assert_eq!(die(&mut env, slot, &NumberInput::literal(1.0)), StepFlow::Halt);
        assert!(!env.is_alive(slot));
    }

    #[test]
    fn test_reproduce_queues_independent_child() {
        let mut env = world(false);
        let slot = place(&mut env, 0, 50.0, 50.0);
        env.agent_mut(slot).unwrap().properties.set("energy", Value::Number(5.0));

        reproduce(&mut env, slot, &NumberInput::literal(1.0));
        assert_eq!(env.agent_count(), 1);
        env.finish_tick();
        assert_eq!(env.agent_count(), 2);

        let child = env.agent(1).unwrap().clone();
        assert_eq!(child.id, AgentId(1));
        assert!((child.position - Vector2::new(50.0, 50.0)).abs().max() <= REPRODUCE_OFFSET);

        env.agent_mut(1).unwrap().properties.increment("energy", 1.0);
        assert_eq!(env.agent(0).unwrap().properties.number("energy"), Some(5.0));
    }

    #[test]
    fn test_collision_removes_target_once() {
        let mut env = world(false);
        let wolf = place(&mut env, 1, 50.0, 50.0);
        let sheep = place(&mut env, 0, 53.0, 50.0);
        env.rebuild_index();

        let radius = NumberInput::literal(10.0);
        on_collision(&mut env, wolf, 0, &radius, &Action::RemoveTarget);
        assert!(!env.is_alive(sheep));
        assert_eq!(env.agent_count(), 1);

        // The eaten sheep is not found again
        on_collision(&mut env, wolf, 0, &radius, &Action::RemoveTarget);
        assert_eq!(env.finish_tick().removed, 1);
    }

    #[test]
    fn test_collision_ignores_target_that_moved_away_this_tick() {
        let mut env = world(false);
        let sheep = place(&mut env, 0, 55.0, 50.0);
        let wolf = place(&mut env, 1, 50.0, 50.0);
        env.rebuild_index();

        // The sheep runs first and leaves the wolf's reach
        env.agent_mut(sheep).unwrap().set_velocity(Vector2::new(1.0, 0.0));
        move_forward(&mut env, sheep, &NumberInput::literal(40.0));

        on_collision(&mut env, wolf, 0, &NumberInput::literal(10.0), &Action::RemoveTarget);
        assert!(env.is_alive(sheep));
        assert_eq!(env.agent_count(), 2);
    }

    #[test]
    fn test_move_toward_uses_live_positions() {
        let mut env = world(false);
        let wolf = place(&mut env, 1, 50.0, 50.0);
        let near = place(&mut env, 0, 55.0, 50.0);
        place(&mut env, 0, 40.0, 50.0);
        env.rebuild_index();

        // The snapshot-nearest sheep has since fled past the other one
        env.agent_mut(near).unwrap().position = Vector2::new(80.0, 50.0);

        move_relative(&mut env, wolf, 0, &NumberInput::literal(1.0), false);
        assert_relative_eq!(env.agent(wolf).unwrap().position.x, 49.0, epsilon = 1e-9);
    }

    #[test]
    fn test_flock_neighbor_out_of_reach_is_ignored() {
        let mut env = world(false);
        let a = place(&mut env, 0, 50.0, 50.0);
        let b = place(&mut env, 0, 60.0, 50.0);
        env.rebuild_index();
        env.agent_mut(b).unwrap().position = Vector2::new(90.0, 50.0);

        cohere(&mut env, a, &NumberInput::literal(25.0), &NumberInput::literal(1.0));
        assert_eq!(env.agent(a).unwrap().velocity, Vector2::zeros());
    }

    #[test]
    fn test_on_property_missing_counts_as_zero() {
        let mut env = world(false);
        let slot = place(&mut env, 0, 1.0, 1.0);
        let threshold = ValueInput::new(Some(ParamValue::from(0.0)), Value::Number(0.0));
        let flow = on_property(
            &mut env,
            slot,
            "energy",
            Condition::Lte,
            &threshold,
            &Action::RemoveSelf,
        );
        assert_eq!(flow, StepFlow::Halt);
        assert!(!env.is_alive(slot));
    }

    #[test]
    fn test_set_and_increment_actions() {
        let mut env = world(false);
        let slot = place(&mut env, 0, 1.0, 1.0);
        apply_action(
            &mut env,
            slot,
            None,
            &Action::SetProperty {
                property: "infected".into(),
                value: ValueInput::new(Some(ParamValue::Literal(Value::Bool(true))), Value::Bool(false)),
            },
        );
        increment_property(&mut env, slot, "age", &NumberInput::literal(1.0));
        increment_property(&mut env, slot, "age", &NumberInput::literal(1.0));

        let props = &env.agent(slot).unwrap().properties;
        assert_eq!(props.get("infected"), Some(&Value::Bool(true)));
        assert_eq!(props.number("age"), Some(2.0));
    }
}
