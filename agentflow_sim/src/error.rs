//! Error types reported through the engine's error channel.

use agentflow_core::CompileError;
use thiserror::Error;

/// Errors surfaced by [`SimulationEngine`](crate::SimulationEngine).
///
/// These are delivered to the `on_error` callback and returned from the
/// failing call; playback operations never produce them.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// The model failed to compile; the previous state is kept
    #[error("Model failed to compile: {0}")]
    Compile(#[from] CompileError),

    /// The model document could not be parsed
    #[error("Failed to load model: {0}")]
    ModelLoad(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(e: serde_json::Error) -> Self {
        Self::ModelLoad(e.to_string())
    }
}
