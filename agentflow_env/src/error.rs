//! Error types for the AgentFlow host abstraction.

use thiserror::Error;

/// Errors that can occur between a host and the engine it drives.
#[derive(Debug, Error)]
pub enum HostError {
    /// The shared engine lock was poisoned by a panicking holder
    #[error("Engine lock poisoned: {0}")]
    Poisoned(String),
}

impl HostError {
    /// Creates a poisoned-lock error.
    pub fn poisoned(msg: impl Into<String>) -> Self {
        Self::Poisoned(msg.into())
    }
}
