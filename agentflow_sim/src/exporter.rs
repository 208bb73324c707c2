//! JSON exporter for replay and external plotting.
//!
//! Exports sampled simulation frames (agent snapshots plus chart series
//! values) as a single JSON document.

use agentflow_core::{AgentSnapshot, AgentVisual, SeriesValue};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;

/// A single sampled frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimFrame {
    /// Tick the frame was taken after
    pub tick: u64,

    pub agent_count: usize,

    /// Live agents at this tick
    pub agents: Vec<AgentSnapshot>,

    /// Latest value of every chart series
    pub series: Vec<SeriesValue>,

    /// Events since the previous frame (extinctions, ceilings, etc.)
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub events: Vec<SimEvent>,
}

/// Simulation event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimEvent {
    pub tick: u64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
}

impl SimEvent {
    pub fn info(tick: u64, message: impl Into<String>) -> Self {
        Self {
            tick,
            message: message.into(),
            level: None,
        }
    }

    pub fn warn(tick: u64, message: impl Into<String>) -> Self {
        Self {
            tick,
            message: message.into(),
            level: Some("warn".to_string()),
        }
    }
}

/// Complete simulation export.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimExport {
    /// Scenario or model label
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Tick of the last exported frame
    pub ticks: u64,

    /// Per-type render metadata
    pub visuals: Vec<AgentVisual>,

    /// All frames
    pub frames: Vec<SimFrame>,

    /// Final results
    pub passed: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64, visuals: Vec<AgentVisual>) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            ticks: 0,
            visuals,
            frames: Vec::new(),
            passed: false,
            failure_reason: None,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: SimFrame) {
        self.ticks = frame.tick;
        self.frames.push(frame);
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, passed: bool, failure_reason: Option<String>) {
        self.passed = passed;
        self.failure_reason = failure_reason;
    }

    /// Writes to a JSON file.
    pub fn write_to_file(&self, path: &str) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
