//! Model compilation and setup.
//!
//! [`compile_model`] validates a [`Model`] and lowers it into a
//! [`CompiledModel`]: one [`TickFunction`] per agent type, the visual
//! metadata the renderer needs, and a [`SetupPlan`] that instantiates the
//! populations into a fresh [`Environment`]. The compiled model is an
//! immutable value; running it never mutates it.

use crate::agent::Agent;
use crate::behavior::{compile_pipeline, TickFunction, TypeResolver};
use crate::bounds::Bounds;
use crate::environment::{Environment, TickStats};
use crate::error::CompileError;
use crate::model::{
    AgentShape, Distribution, EnvironmentSettings, Model, Parameter, Visualization,
};
use crate::params::ParameterTable;
use crate::properties::PropertyBag;
use nalgebra::Vector2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution as _, Normal};
use serde::{Deserialize, Serialize};
use std::f64::consts::TAU;
use tracing::{debug, info};

/// Cluster count when a cluster population does not name one.
pub const DEFAULT_CLUSTERS: usize = 3;

/// Cluster spread, as a fraction of the shorter world side.
pub const DEFAULT_SPREAD_FRACTION: f64 = 0.05;

/// Derives the behavior RNG seed from the master seed.
///
/// Setup draws from the master seed directly; behaviors get an independent
/// stream so adding a population never shifts behavior randomness.
pub fn behavior_seed(seed: u64) -> u64 {
    seed.wrapping_mul(0x9e3779b97f4a7c15)
}

/// Per-type rendering metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentVisual {
    pub type_id: String,
    pub name: String,
    pub color: String,
    pub shape: AgentShape,
    pub size: f64,
}

/// One population, with its agent type resolved.
#[derive(Debug, Clone)]
pub struct PopulationPlan {
    pub type_index: usize,
    pub count: usize,
    pub distribution: Distribution,
    pub clusters: Option<usize>,
    pub spread: Option<f64>,
}

/// Everything needed to instantiate agents into an empty environment.
#[derive(Debug, Clone)]
pub struct SetupPlan {
    pub populations: Vec<PopulationPlan>,

    /// Property defaults per agent type
    pub templates: Vec<PropertyBag>,
}

impl SetupPlan {
    /// Total number of agents the plan creates.
    pub fn total(&self) -> usize {
        self.populations.iter().map(|p| p.count).sum()
    }
}

/// A model lowered into executable form.
#[derive(Debug)]
pub struct CompiledModel {
    pub settings: EnvironmentSettings,
    pub type_ids: Vec<String>,
    pub visuals: Vec<AgentVisual>,
    pub setup: SetupPlan,
    pub visualizations: Vec<Visualization>,
    pub parameters: Vec<Parameter>,
    tick_functions: Vec<TickFunction>,
    types: TypeResolver,
}

/// Validates and compiles a model.
///
/// Fails on the first unknown behavior or action kind, dangling target,
/// malformed parameter reference, population of an unknown type, or
/// degenerate world size.
pub fn compile_model(model: &Model) -> Result<CompiledModel, CompileError> {
    let settings = model.environment.clone();
    for (name, side) in [("width", settings.width), ("height", settings.height)] {
        if !(side.is_finite() && side > 0.0) {
            return Err(CompileError::invalid(
                "environment",
                name,
                format!("must be a positive number, got {}", side),
            ));
        }
    }
    let bounds = Bounds::from_settings(&settings);
    let types = TypeResolver::new(&model.agent_types);

    let tick_functions = model
        .agent_types
        .iter()
        .enumerate()
        .map(|(index, ty)| compile_pipeline(ty, index, &types, bounds))
        .collect::<Result<Vec<_>, _>>()?;

    let populations = model
        .populations
        .iter()
        .map(|p| {
            let type_index = model
                .agent_types
                .iter()
                .position(|t| t.id == p.agent_type_id)
                .ok_or_else(|| CompileError::UnknownAgentType(p.agent_type_id.clone()))?;
            Ok(PopulationPlan {
                type_index,
                count: p.count,
                distribution: p.distribution,
                clusters: p.clusters,
                spread: p.spread,
            })
        })
        .collect::<Result<Vec<_>, CompileError>>()?;

    let visuals = model
        .agent_types
        .iter()
        .map(|t| AgentVisual {
            type_id: t.id.clone(),
            name: t.name.clone(),
            color: t.color.clone(),
            shape: t.shape,
            size: t.size,
        })
        .collect();

    let templates = model
        .agent_types
        .iter()
        .map(|t| PropertyBag::from_defs(&t.properties))
        .collect();

    let compiled = CompiledModel {
        settings,
        type_ids: model.agent_types.iter().map(|t| t.id.clone()).collect(),
        visuals,
        setup: SetupPlan {
            populations,
            templates,
        },
        visualizations: model.visualizations.clone(),
        parameters: model.parameters.clone(),
        tick_functions,
        types,
    };

    info!(
        "Compiled model: {} agent types, {} populations ({} agents)",
        compiled.type_ids.len(),
        compiled.setup.populations.len(),
        compiled.setup.total()
    );
    Ok(compiled)
}

impl CompiledModel {
    pub fn bounds(&self) -> Bounds {
        Bounds::from_settings(&self.settings)
    }

    pub fn types(&self) -> &TypeResolver {
        &self.types
    }

    pub fn tick_function(&self, type_index: usize) -> Option<&TickFunction> {
        self.tick_functions.get(type_index)
    }

    /// Parameter table seeded from the model's definitions.
    pub fn parameter_table(&self) -> ParameterTable {
        ParameterTable::from_definitions(&self.parameters)
    }

    /// Creates a fresh environment and runs setup into it.
    pub fn instantiate(&self, params: ParameterTable, seed: u64) -> Environment {
        let mut env = Environment::new(
            self.bounds(),
            params,
            self.type_ids.clone(),
            behavior_seed(seed),
        );
        self.run_setup(&mut env, seed);
        env
    }

    /// Instantiates every population into `env`, then primes the index.
    ///
    /// Properties start from the type's defaults. Agents whose pipeline moves
    /// them get a random heading and the parameter-resolved initial speed.
    pub fn run_setup(&self, env: &mut Environment, seed: u64) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let bounds = env.bounds();

        for plan in &self.setup.populations {
            let positions = place_population(plan, bounds, &mut rng);
            let template = self
                .setup
                .templates
                .get(plan.type_index)
                .cloned()
                .unwrap_or_default();
            let speed = self
                .tick_function(plan.type_index)
                .and_then(TickFunction::initial_speed)
                .map(|s| s.resolve(env.params()));

            for position in positions {
                let id = env.allocate_id();
                let mut agent = Agent::new(id, plan.type_index, position);
                agent.properties = template.clone();
                if let Some(speed) = speed {
                    let heading = rng.gen_range(0.0..TAU);
                    agent.velocity = Vector2::new(heading.cos(), heading.sin()) * speed;
                    agent.heading = heading;
                }
                env.insert(agent);
            }
        }

        env.rebuild_index();
        debug!("Setup created {} agents", env.agent_count());
    }

    /// Runs one tick: every live agent's tick function in slot order, then
    /// compaction and index rebuild.
    ///
    /// Agents see each other's updates immediately; an agent removed earlier
    /// in the tick is skipped.
    pub fn run_tick(&self, env: &mut Environment) -> TickStats {
        for slot in 0..env.slot_count() {
            let Some(type_index) = env
                .agent(slot)
                .filter(|a| a.is_alive())
                .map(|a| a.type_index)
            else {
                continue;
            };
            if let Some(tick) = self.tick_functions.get(type_index) {
                tick.run(env, slot);
            }
        }
        env.finish_tick()
    }
}

/// Draws the starting positions of one population.
fn place_population(plan: &PopulationPlan, bounds: Bounds, rng: &mut ChaCha8Rng) -> Vec<Vector2<f64>> {
    let (w, h) = (bounds.width, bounds.height);
    let n = plan.count;

    match plan.distribution {
        Distribution::Random => (0..n)
            .map(|_| Vector2::new(rng.gen_range(0.0..w), rng.gen_range(0.0..h)))
            .collect(),
        Distribution::Grid => {
            if n == 0 {
                return Vec::new();
            }
            let cols = ((n as f64 * w / h).sqrt().ceil() as usize).max(1);
            let rows = n.div_ceil(cols);
            let (cw, ch) = (w / cols as f64, h / rows as f64);
            (0..n)
                .map(|i| {
                    Vector2::new(
                        ((i % cols) as f64 + 0.5) * cw,
                        ((i / cols) as f64 + 0.5) * ch,
                    )
                })
                .collect()
        }
        Distribution::Cluster => {
            let k = plan.clusters.unwrap_or(DEFAULT_CLUSTERS).max(1);
            let spread = plan
                .spread
                .filter(|s| s.is_finite() && *s >= 0.0)
                .unwrap_or(w.min(h) * DEFAULT_SPREAD_FRACTION);
            let centers = (0..k)
                .map(|_| Vector2::new(rng.gen_range(0.0..w), rng.gen_range(0.0..h)))
                .collect::<Vec<_>>();
            let scatter = Normal::new(0.0, spread).ok();

            (0..n)
                .map(|i| {
                    let center = centers[i % k];
                    let offset = match &scatter {
                        Some(normal) => Vector2::new(normal.sample(rng), normal.sample(rng)),
                        None => Vector2::zeros(),
                    };
                    bounds.settle(center + offset)
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgentType, BehaviorSpec, Population, PropertyDef};

    fn sheep_model() -> Model {
        Model {
            environment: EnvironmentSettings {
                width: 200.0,
                height: 100.0,
                ..Default::default()
            },
            agent_types: vec![AgentType::new("sheep")
                .with_property(PropertyDef::number("energy", 10.0))
                .with_behavior(BehaviorSpec::new("random-walk").param("speed", "$walk"))],
            populations: vec![Population::new("sheep", 25)],
            parameters: vec![Parameter::number("walk", 2.0, 0.0, 5.0)],
            visualizations: Vec::new(),
        }
    }

    #[test]
    fn test_population_count_after_setup() {
        let compiled = compile_model(&sheep_model()).unwrap();
        let env = compiled.instantiate(compiled.parameter_table(), 42);
        assert_eq!(env.agent_count(), 25);
        assert_eq!(env.index().len(), 25);
        for agent in env.agents() {
            assert!(env.bounds().contains(agent.position));
            assert_eq!(agent.properties.number("energy"), Some(10.0));
            approx::assert_relative_eq!(agent.velocity.norm(), 2.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_unknown_population_type_is_error() {
        let mut model = sheep_model();
        model.populations.push(Population::new("goat", 1));
        assert_eq!(
            compile_model(&model).unwrap_err(),
            CompileError::UnknownAgentType("goat".into())
        );
    }

    #[test]
    fn test_degenerate_world_is_error() {
        let mut model = sheep_model();
        model.environment.width = 0.0;
        assert!(matches!(
            compile_model(&model).unwrap_err(),
            CompileError::InvalidParameter { .. }
        ));
    }

    #[test]
    fn test_grid_covers_bounds() {
        let plan = PopulationPlan {
            type_index: 0,
            count: 8,
            distribution: Distribution::Grid,
            clusters: None,
            spread: None,
        };
        let bounds = Bounds::new(200.0, 100.0, false);
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let positions = place_population(&plan, bounds, &mut rng);
        assert_eq!(positions.len(), 8);
        assert!(positions.iter().all(|p| bounds.contains(*p)));
        assert_eq!(positions[0], Vector2::new(25.0, 25.0));
    }

    #[test]
    fn test_cluster_stays_in_bounds() {
        let plan = PopulationPlan {
            type_index: 0,
            count: 300,
            distribution: Distribution::Cluster,
            clusters: Some(2),
            spread: Some(40.0),
        };
        let bounds = Bounds::new(100.0, 100.0, false);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let positions = place_population(&plan, bounds, &mut rng);
        assert_eq!(positions.len(), 300);
        assert!(positions.iter().all(|p| bounds.contains(*p)));
    }

    #[test]
    fn test_same_seed_same_positions() {
        let compiled = compile_model(&sheep_model()).unwrap();
        let mut a = compiled.instantiate(compiled.parameter_table(), 7);
        let mut b = compiled.instantiate(compiled.parameter_table(), 7);
        for _ in 0..20 {
            compiled.run_tick(&mut a);
            compiled.run_tick(&mut b);
        }
        let pa = a.agents().map(|x| x.position).collect::<Vec<_>>();
        let pb = b.agents().map(|x| x.position).collect::<Vec<_>>();
        assert_eq!(pa, pb);
    }
}
