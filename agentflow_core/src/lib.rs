//! AgentFlow Core - Agent-Based Model Compiler and Runtime
//!
//! Turns a declarative model (agent types, behaviors, populations,
//! parameters, charts) into a steppable simulation:
//! 1. **Behavior compiler**: each behavior descriptor becomes a step closure;
//!    steps compose into one tick function per agent type
//! 2. **Environment**: live agents, parameter table and an R*-tree spatial
//!    index rebuilt once per tick, with torus-aware neighbor queries
//! 3. **Metrics**: per-tick chart series aggregated over agent properties

pub mod agent;
pub mod behavior;
pub mod bounds;
pub mod compiler;
pub mod environment;
pub mod error;
pub mod metrics;
pub mod model;
pub mod params;
pub mod properties;
pub mod spatial;
pub mod value;

// Re-export key types for convenience
pub use agent::{Agent, AgentId, AgentSnapshot};
pub use behavior::{BehaviorKind, StepFlow, TickFunction, TypeResolver, UpdateStep};
pub use bounds::Bounds;
pub use compiler::{compile_model, AgentVisual, CompiledModel, SetupPlan};
pub use environment::{Environment, TickStats};
pub use error::CompileError;
pub use metrics::{MetricPoint, MetricsFeed, SeriesValue};
pub use model::{
    AgentType, Aggregation, BehaviorSpec, ChartSeries, Distribution, EnvironmentSettings,
    MetricConfig, Model, Parameter, ParameterKind, Population, PropertyDef, Visualization,
};
pub use params::ParameterTable;
pub use spatial::{SpatialIndex, TypeFilter};
pub use value::{ParamValue, Value};
