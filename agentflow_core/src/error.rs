//! Compile-time error types for the model and behavior compilers.

use thiserror::Error;

/// Errors raised while lowering a [`Model`](crate::model::Model) into a
/// [`CompiledModel`](crate::compiler::CompiledModel).
///
/// Any of these is fatal to the compilation that produced it: no partial
/// environment is ever built from a model that failed to compile.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    /// A behavior descriptor names a kind the compiler does not know
    #[error("Unknown behavior kind '{kind}' on agent type '{agent_type}'")]
    UnknownBehavior { agent_type: String, kind: String },

    /// An event behavior names an action the compiler does not know
    #[error("Unknown action '{action}' in behavior '{behavior}' on agent type '{agent_type}'")]
    UnknownAction {
        agent_type: String,
        behavior: String,
        action: String,
    },

    /// A behavior targets an agent type that is not part of the model
    #[error("Behavior '{behavior}' on agent type '{agent_type}' targets unknown agent type '{target}'")]
    DanglingTarget {
        agent_type: String,
        behavior: String,
        target: String,
    },

    /// A population requests an agent type that is not part of the model
    #[error("Population references unknown agent type '{0}'")]
    UnknownAgentType(String),

    /// A parameter reference marker with no usable name (e.g. a bare `$`)
    #[error("Malformed parameter reference '{reference}' for '{param}' in behavior '{behavior}'")]
    MalformedParameterRef {
        behavior: String,
        param: String,
        reference: String,
    },

    /// A required parameter is missing or has the wrong shape
    #[error("Invalid parameter '{param}' in behavior '{behavior}': {reason}")]
    InvalidParameter {
        behavior: String,
        param: String,
        reason: String,
    },
}

impl CompileError {
    /// Creates an invalid-parameter error.
    pub fn invalid(
        behavior: impl Into<String>,
        param: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidParameter {
            behavior: behavior.into(),
            param: param.into(),
            reason: reason.into(),
        }
    }
}
