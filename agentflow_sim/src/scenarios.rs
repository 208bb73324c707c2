//! Built-in model scenarios.
//!
//! Each scenario is an ordinary [`Model`], built the same way the editor
//! would author it, so running one exercises the full compile path.

use agentflow_core::{
    Aggregation, AgentType, BehaviorSpec, ChartSeries, Distribution, EnvironmentSettings,
    MetricConfig, Model, Parameter, Population, PropertyDef, Visualization,
};
use serde_json::json;

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Sheep graze and breed, wolves hunt them
    PredatorPrey,

    /// Boids with separation, alignment and cohesion on a torus
    Flocking,

    /// Cells burn energy, forage regrowing food and starve
    Foraging,
}

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::PredatorPrey,
            ScenarioId::Flocking,
            ScenarioId::Foraging,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::PredatorPrey => "predator_prey",
            ScenarioId::Flocking => "flocking",
            ScenarioId::Foraging => "foraging",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::PredatorPrey => "200 sheep vs 40 wolves: hunting, breeding, random deaths",
            ScenarioId::Flocking => "150 boids on a torus: separate + align + cohere + wiggle",
            ScenarioId::Foraging => "120 cells with energy budgets foraging 150 regrowing food patches",
        }
    }

    /// Builds the scenario's model at its default size.
    pub fn model(&self) -> Model {
        match self {
            ScenarioId::PredatorPrey => predator_prey(200, 40),
            ScenarioId::Flocking => flocking(150),
            ScenarioId::Foraging => foraging(120, 150),
        }
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "predator_prey" | "predatorprey" | "wolf_sheep" => Ok(ScenarioId::PredatorPrey),
            "flocking" | "boids" => Ok(ScenarioId::Flocking),
            "foraging" | "energy" => Ok(ScenarioId::Foraging),
            _ => Err(format!("Unknown scenario: {}", s)),
        }
    }
}

fn count_series(id: &str, label: &str, color: &str, agent_type: &str) -> ChartSeries {
    ChartSeries {
        id: id.to_string(),
        label: label.to_string(),
        color: color.to_string(),
        agent_type_id: agent_type.to_string(),
        metric: MetricConfig::count(),
    }
}

/// Wolf-sheep predation.
///
/// Sheep: random-walk, reproduce(p=0.03), die(p=0.001).
/// Wolves: move-toward(sheep), on-collision(sheep, r=10, remove-target),
/// reproduce(p=0.05), die(p=0.02).
pub fn predator_prey(sheep: usize, wolves: usize) -> Model {
    let sheep_type = AgentType::new("sheep")
        .with_color("#f8fafc")
        .with_behavior(BehaviorSpec::new("random-walk").param("speed", "$sheepSpeed"))
        .with_behavior(BehaviorSpec::new("reproduce").param("probability", "$sheepBirthRate"))
        .with_behavior(BehaviorSpec::new("die").param("probability", 0.001));

    let wolf_type = AgentType::new("wolf")
        .with_color("#64748b")
        .with_behavior(
            BehaviorSpec::new("move-toward")
                .param("target", "sheep")
                .param("speed", "$wolfSpeed"),
        )
        .with_behavior(
            BehaviorSpec::new("on-collision")
                .param("target", "sheep")
                .param("radius", 10.0)
                .param("action", "remove-target"),
        )
        .with_behavior(BehaviorSpec::new("reproduce").param("probability", "$wolfBirthRate"))
        .with_behavior(BehaviorSpec::new("die").param("probability", 0.02));

    Model {
        environment: EnvironmentSettings::default(),
        agent_types: vec![sheep_type, wolf_type],
        populations: vec![Population::new("sheep", sheep), Population::new("wolf", wolves)],
        parameters: vec![
            Parameter::number("sheepSpeed", 1.0, 0.0, 5.0),
            Parameter::number("wolfSpeed", 1.0, 0.0, 5.0),
            Parameter::number("sheepBirthRate", 0.03, 0.0, 1.0),
            Parameter::number("wolfBirthRate", 0.05, 0.0, 1.0),
        ],
        visualizations: vec![Visualization {
            id: "population".to_string(),
            name: "Population".to_string(),
            kind: "line".to_string(),
            series: vec![
                count_series("sheep", "Sheep", "#f8fafc", "sheep"),
                count_series("wolves", "Wolves", "#64748b", "wolf"),
            ],
        }],
    }
}

/// Classic boids on a wraparound world.
pub fn flocking(boids: usize) -> Model {
    let boid = AgentType::new("boid")
        .with_color("#38bdf8")
        .with_behavior(
            BehaviorSpec::new("separate")
                .param("radius", 10.0)
                .param("strength", "$separation"),
        )
        .with_behavior(BehaviorSpec::new("align").param("strength", "$alignment"))
        .with_behavior(BehaviorSpec::new("cohere").param("strength", "$cohesion"))
        .with_behavior(BehaviorSpec::new("wiggle").param("angle", 5.0))
        .with_behavior(BehaviorSpec::new("move-forward").param("speed", "$boidSpeed"));

    Model {
        environment: EnvironmentSettings {
            wraparound: true,
            ..Default::default()
        },
        agent_types: vec![boid],
        populations: vec![Population::new("boid", boids)],
        parameters: vec![
            Parameter::number("boidSpeed", 2.0, 0.0, 10.0),
            Parameter::number("separation", 1.5, 0.0, 5.0),
            Parameter::number("alignment", 1.0, 0.0, 5.0),
            Parameter::number("cohesion", 1.0, 0.0, 5.0),
        ],
        visualizations: vec![Visualization {
            id: "flock".to_string(),
            name: "Flock".to_string(),
            kind: "line".to_string(),
            series: vec![count_series("boids", "Boids", "#38bdf8", "boid")],
        }],
    }
}

/// Energy-budget foraging.
///
/// Cells lose one unit of energy per tick, gain 20 when they touch food and
/// are removed when energy hits zero. Food patches vanish when touched,
/// regrow by reproduction and decay slowly.
pub fn foraging(cells: usize, food: usize) -> Model {
    let cell = AgentType::new("cell")
        .with_color("#facc15")
        .with_property(PropertyDef::number("energy", 50.0).with_range(0.0, 100.0))
        .with_property(PropertyDef::number("age", 0.0))
        .with_behavior(BehaviorSpec::new("random-walk").param("speed", 1.5))
        .with_behavior(BehaviorSpec::new("bounce"))
        .with_behavior(BehaviorSpec::new("increment-property").param("property", "age"))
        .with_behavior(
            BehaviorSpec::new("increment-property")
                .param("property", "energy")
                .param("amount", "$metabolism"),
        )
        .with_behavior(
            BehaviorSpec::new("on-collision")
                .param("target", "food")
                .param("radius", 8.0)
                .param(
                    "action",
                    json!({ "type": "increment-property", "property": "energy", "amount": 20 }),
                ),
        )
        .with_behavior(
            BehaviorSpec::new("on-property")
                .param("property", "energy")
                .param("condition", "lte")
                .param("threshold", 0)
                .param("action", "remove-self"),
        )
        .with_behavior(BehaviorSpec::new("reproduce").param("probability", 0.01));

    let food_type = AgentType::new("food")
        .with_color("#22c55e")
        .with_behavior(
            BehaviorSpec::new("on-collision")
                .param("target", "cell")
                .param("radius", 8.0)
                .param("action", "remove-self"),
        )
        .with_behavior(BehaviorSpec::new("reproduce").param("probability", "$regrowth"))
        .with_behavior(BehaviorSpec::new("die").param("probability", 0.005));

    Model {
        environment: EnvironmentSettings::default(),
        agent_types: vec![cell, food_type],
        populations: vec![
            Population::new("cell", cells),
            Population::new("food", food).with_distribution(Distribution::Grid),
        ],
        parameters: vec![
            Parameter::number("metabolism", -1.0, -5.0, 0.0),
            Parameter::number("regrowth", 0.01, 0.0, 0.2),
        ],
        visualizations: vec![
            Visualization {
                id: "population".to_string(),
                name: "Population".to_string(),
                kind: "line".to_string(),
                series: vec![
                    count_series("cells", "Cells", "#facc15", "cell"),
                    count_series("food", "Food", "#22c55e", "food"),
                ],
            },
            Visualization {
                id: "energy".to_string(),
                name: "Energy".to_string(),
                kind: "line".to_string(),
                series: vec![
                    ChartSeries {
                        id: "mean".to_string(),
                        label: "Mean energy".to_string(),
                        color: "#f97316".to_string(),
                        agent_type_id: "cell".to_string(),
                        metric: MetricConfig::over(Aggregation::Mean, "energy"),
                    },
                    ChartSeries {
                        id: "median_age".to_string(),
                        label: "Median age".to_string(),
                        color: "#a855f7".to_string(),
                        agent_type_id: "cell".to_string(),
                        metric: MetricConfig::over(Aggregation::Median, "age"),
                    },
                ],
            },
        ],
    }
}
