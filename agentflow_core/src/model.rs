//! Declarative model definitions.
//!
//! These types mirror the JSON documents produced by the external editor.
//! The compiler only ever reads them; the runtime never mutates a `Model`.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A complete user-authored model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    /// World bounds and boundary policy
    #[serde(default)]
    pub environment: EnvironmentSettings,

    /// Agent type definitions
    #[serde(default)]
    pub agent_types: Vec<AgentType>,

    /// Instantiation requests
    #[serde(default)]
    pub populations: Vec<Population>,

    /// Runtime-adjustable parameters
    #[serde(default)]
    pub parameters: Vec<Parameter>,

    /// Chart definitions evaluated every tick
    #[serde(default)]
    pub visualizations: Vec<Visualization>,
}

impl Model {
    /// Parses a model from the editor's JSON representation.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Returns true if the model has something to run: at least one agent
    /// type and at least one population.
    pub fn is_runnable(&self) -> bool {
        !self.agent_types.is_empty() && !self.populations.is_empty()
    }

    /// Sum of all population counts.
    pub fn total_population(&self) -> usize {
        self.populations.iter().map(|p| p.count).sum()
    }

    /// Looks up an agent type by id.
    pub fn agent_type(&self, id: &str) -> Option<&AgentType> {
        self.agent_types.iter().find(|t| t.id == id)
    }

    /// Looks up a parameter by name.
    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.name == name)
    }
}

/// Environment bounds and boundary policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSettings {
    pub width: f64,
    pub height: f64,

    /// Toroidal world: leaving one edge re-enters the opposite edge
    #[serde(default)]
    pub wraparound: bool,

    #[serde(default = "default_background")]
    pub background_color: String,
}

impl Default for EnvironmentSettings {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
            wraparound: false,
            background_color: default_background(),
        }
    }
}

fn default_background() -> String {
    "#0f172a".to_string()
}

/// One kind of agent: visuals, custom properties and its behavior pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentType {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub shape: AgentShape,

    #[serde(default = "default_size")]
    pub size: f64,

    /// Custom per-agent properties
    #[serde(default)]
    pub properties: Vec<PropertyDef>,

    /// Behaviors in execution order
    #[serde(default)]
    pub behaviors: Vec<BehaviorSpec>,
}

impl AgentType {
    /// Creates an agent type with default visuals and no behaviors.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            color: default_color(),
            shape: AgentShape::default(),
            size: default_size(),
            properties: Vec::new(),
            behaviors: Vec::new(),
        }
    }

    /// Appends a behavior.
    pub fn with_behavior(mut self, behavior: BehaviorSpec) -> Self {
        self.behaviors.push(behavior);
        self
    }

    /// Appends a custom property.
    pub fn with_property(mut self, property: PropertyDef) -> Self {
        self.properties.push(property);
        self
    }

    /// Sets the display color.
    pub fn with_color(mut self, color: &str) -> Self {
        self.color = color.to_string();
        self
    }
}

fn default_color() -> String {
    "#4ade80".to_string()
}

fn default_size() -> f64 {
    5.0
}

/// Render shape of an agent type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentShape {
    #[default]
    Circle,
    Square,
    Triangle,
}

/// Declared type of a custom property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropertyKind {
    #[default]
    Number,
    Boolean,
    String,
}

/// A custom property definition on an agent type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDef {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: PropertyKind,

    #[serde(default)]
    pub default: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl PropertyDef {
    /// Creates an unbounded numeric property.
    pub fn number(name: &str, default: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: PropertyKind::Number,
            default: Value::Number(default),
            min: None,
            max: None,
        }
    }

    /// Creates a boolean property.
    pub fn boolean(name: &str, default: bool) -> Self {
        Self {
            name: name.to_string(),
            kind: PropertyKind::Boolean,
            default: Value::Bool(default),
            min: None,
            max: None,
        }
    }

    /// Sets numeric bounds.
    pub fn with_range(mut self, min: f64, max: f64) -> Self {
        self.min = Some(min);
        self.max = Some(max);
        self
    }
}

/// A declarative behavior descriptor as authored in the editor.
///
/// The kind string and parameter map stay raw here; the behavior compiler
/// parses them so an unknown kind is a compile error rather than a
/// deserialization failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorSpec {
    #[serde(default)]
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Value>,
}

fn default_enabled() -> bool {
    true
}

impl BehaviorSpec {
    /// Creates an enabled behavior with no parameters.
    pub fn new(kind: &str) -> Self {
        Self {
            id: kind.to_string(),
            kind: kind.to_string(),
            enabled: true,
            params: BTreeMap::new(),
        }
    }

    /// Adds a parameter.
    pub fn param(mut self, name: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    /// Marks the behavior disabled.
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// How a population is scattered over the environment at setup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Distribution {
    /// Uniform random over the bounds
    #[default]
    Random,
    /// Evenly spaced lattice covering the bounds
    Grid,
    /// Normal scatter around uniformly drawn centers
    Cluster,
}

/// A request to instantiate `count` agents of one type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Population {
    pub agent_type_id: String,
    pub count: usize,

    #[serde(default)]
    pub distribution: Distribution,

    /// Number of cluster centers (cluster distribution only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clusters: Option<usize>,

    /// Standard deviation of the scatter around each center
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spread: Option<f64>,
}

impl Population {
    /// Creates a uniformly random population.
    pub fn new(agent_type_id: &str, count: usize) -> Self {
        Self {
            agent_type_id: agent_type_id.to_string(),
            count,
            distribution: Distribution::Random,
            clusters: None,
            spread: None,
        }
    }

    /// Sets the distribution.
    pub fn with_distribution(mut self, distribution: Distribution) -> Self {
        self.distribution = distribution;
        self
    }
}

/// Declared type of a model parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterKind {
    #[default]
    Number,
    Boolean,
    Choice,
}

/// A named, runtime-adjustable scalar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: ParameterKind,

    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<f64>,

    /// Allowed values for `choice` parameters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
}

impl Parameter {
    /// Creates a numeric slider parameter.
    pub fn number(name: &str, value: f64, min: f64, max: f64) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::Number,
            value: Value::Number(value),
            min: Some(min),
            max: Some(max),
            step: None,
            options: Vec::new(),
        }
    }

    /// Creates a boolean toggle parameter.
    pub fn boolean(name: &str, value: bool) -> Self {
        Self {
            name: name.to_string(),
            kind: ParameterKind::Boolean,
            value: Value::Bool(value),
            min: None,
            max: None,
            step: None,
            options: Vec::new(),
        }
    }
}

/// A chart fed by per-tick aggregations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visualization {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type", default = "default_chart")]
    pub kind: String,

    #[serde(default)]
    pub series: Vec<ChartSeries>,
}

fn default_chart() -> String {
    "line".to_string()
}

/// One line/bar of a chart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSeries {
    pub id: String,

    #[serde(default)]
    pub label: String,

    #[serde(default)]
    pub color: String,

    pub agent_type_id: String,

    pub metric: MetricConfig,
}

/// Aggregation applied to one agent type each tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    Count,
    Mean,
    Min,
    Max,
    Sum,
    Median,
}

/// What a series measures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricConfig {
    #[serde(rename = "type")]
    pub aggregation: Aggregation,

    /// Property aggregated by everything except `count`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub property: Option<String>,
}

impl MetricConfig {
    /// Population count of the series' agent type.
    pub fn count() -> Self {
        Self {
            aggregation: Aggregation::Count,
            property: None,
        }
    }

    /// Aggregation over a numeric property.
    pub fn over(aggregation: Aggregation, property: &str) -> Self {
        Self {
            aggregation,
            property: Some(property.to_string()),
        }
    }
}
