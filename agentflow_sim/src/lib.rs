//! AgentFlow Simulation Engine
//!
//! This crate owns the runtime half of AgentFlow: it takes a compiled model
//! from `agentflow_core`, builds a live environment from it, and advances it
//! tick by tick under a play / pause / step / reset state machine.
//!
//! # Core Principle: One Writer
//!
//! All simulation state lives in a [`SimulationEngine`] and every operation
//! takes `&mut self`. A host-driven loop ([`driver::run_playback`]) shares
//! the engine behind a mutex and runs one frame's batch of ticks per lock, so
//! parameter changes and lifecycle calls always land between ticks.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SimulationEngine                       │
//! │  ┌──────────────┐   ┌───────────────┐   ┌───────────────┐   │
//! │  │ CompiledModel│──►│  Environment  │──►│  MetricsFeed  │   │
//! │  │ (tick fns)   │   │ (agents+index)│   │ (chart series)│   │
//! │  └──────────────┘   └───────────────┘   └───────────────┘   │
//! │          ▲                  ▲                               │
//! │          │ initialize/reset │ frame(token)                  │
//! │  ┌───────┴──────────────────┴───────┐                       │
//! │  │   HostContext (next_frame loop)  │                       │
//! │  └──────────────────────────────────┘                       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use agentflow_sim::{EngineConfig, SimulationEngine};
//! use agentflow_sim::scenarios::predator_prey;
//!
//! let mut engine = SimulationEngine::new(EngineConfig::default());
//! engine.initialize(predator_prey(200, 40))?;
//! engine.step();
//! println!("{} agents", engine.agent_count());
//! ```

mod context;
pub mod driver;
mod engine;
mod error;
mod exporter;
mod runner;
pub mod scenarios;

pub use context::SimHost;
pub use engine::{
    EngineConfig, ErrorCallback, FrameOutcome, PlaybackState, SimulationEngine, TickCallback,
    TickReport,
};
pub use error::EngineError;
pub use exporter::{SimEvent, SimExport, SimFrame};
pub use runner::{ScenarioMetrics, ScenarioResult, ScenarioRunner};
