// SPDX-License-Identifier: MIT

//! Typed error handling for switchboard-rs
//!
//! Build-time problems (`GraphDefinitionError`) and run-time aborts
//! (`ExecutionError`) are kept apart so callers can tell a malformed graph
//! from a graph that misbehaved while running. Step failures never show up
//! here: steps report them as degraded outcomes instead.

use thiserror::Error;

/// Top-level error type for switchboard-rs
#[derive(Debug, Error)]
pub enum SwitchboardError {
    /// Structural problem found while compiling a graph
    #[error("Graph definition error: {0}")]
    Graph(#[from] GraphDefinitionError),

    /// An invocation aborted
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Checkpoint store failure outside of an invocation
    #[error("Checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    /// Model/LLM errors
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    /// Configuration errors (bad env vars, invalid definitions)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper
    #[error("{0}")]
    Other(String),
}

impl SwitchboardError {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create from a generic message
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

impl From<&str> for SwitchboardError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for SwitchboardError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

/// Raised by `GraphBuilder` registration calls and by `compile()`
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GraphDefinitionError {
    /// A step with this name is already registered
    #[error("step '{0}' is already registered")]
    DuplicateStep(String),

    /// The name collides with the synthetic terminal node
    #[error("'{0}' is reserved and cannot name a step")]
    ReservedName(String),

    /// `set_entry` named a step that was never registered
    #[error("entry step '{0}' is not registered")]
    UnknownStep(String),

    /// `compile()` without an entry step
    #[error("graph '{0}' has no entry step")]
    MissingEntry(String),

    /// An unconditional edge points at an unknown step
    #[error("edge {from} -> {to} targets an unregistered step")]
    DanglingEdge { from: String, to: String },

    /// A conditional edge label maps to an unknown step
    #[error("route {from} --[{label}]--> {target} targets an unregistered step")]
    DanglingLabel {
        from: String,
        label: String,
        target: String,
    },

    /// An edge leaves a step that does not exist
    #[error("edge source '{0}' is not a registered step")]
    UnknownSource(String),

    /// A step declares more than one outgoing edge
    #[error("step '{0}' declares more than one outgoing edge")]
    ConflictingEdges(String),

    /// A conditional edge with no labels
    #[error("conditional edge from '{0}' declares no labels")]
    EmptyLabelMap(String),

    /// Steps not reachable from the entry (only fatal in deny mode)
    #[error("unreachable steps: {0:?}")]
    Unreachable(Vec<String>),

    /// The state schema combines types and reducers that cannot work
    #[error("invalid state schema: {0}")]
    InvalidSchema(String),
}

/// Aborts an invocation. The checkpoint for the thread is left untouched.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A router returned a label missing from its declared map
    #[error("router after '{step}' returned '{label}', expected one of {allowed:?}")]
    InvalidRoute {
        step: String,
        label: String,
        allowed: Vec<String>,
    },

    /// The step budget ran out before reaching the end
    #[error("step budget of {limit} exhausted before running '{step}'")]
    StepBudgetExceeded { limit: u32, step: String },

    /// An update violated a declared field type
    #[error("field '{key}' expects {expected}, got {found}")]
    StateType {
        key: String,
        expected: String,
        found: String,
    },

    /// Loading or saving the thread snapshot failed
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The blocking runtime for `invoke` could not be started
    #[error("failed to start runtime: {0}")]
    Runtime(#[from] std::io::Error),
}

/// Checkpoint store errors
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("corrupt snapshot: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid thread id: {0:?}")]
    InvalidThreadId(String),
}

/// Classifier errors; the dispatcher turns every one of these into the
/// configured default category
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("model call failed: {0}")]
    Model(#[from] ModelError),

    #[error("classifier timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("classifier returned unknown category '{0}'")]
    UnknownCategory(String),

    #[error("classifier returned no answer")]
    Empty,

    #[error("{0}")]
    Other(String),
}

/// Model/LLM-specific errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// API key not configured
    #[error("API key not configured for provider: {0}")]
    ApiKeyMissing(String),

    /// Base URL could not be parsed
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    /// Rate limit exceeded
    #[error("Rate limit exceeded, retry after {retry_after_secs:?} seconds")]
    RateLimited { retry_after_secs: Option<u64> },

    /// Non-success HTTP status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid response from model
    #[error("Invalid response from model: {0}")]
    InvalidResponse(String),

    /// HTTP request errors
    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_error_converts_to_top_level() {
        let err: SwitchboardError = GraphDefinitionError::MissingEntry("g".into()).into();
        assert!(matches!(err, SwitchboardError::Graph(_)));
        assert!(err.to_string().contains("no entry step"));
    }

    #[test]
    fn test_invalid_route_message_lists_labels() {
        let err = ExecutionError::InvalidRoute {
            step: "verify".into(),
            label: "maybe".into(),
            allowed: vec!["accept".into(), "retry".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("verify"));
        assert!(msg.contains("maybe"));
        assert!(msg.contains("accept"));
    }

    #[test]
    fn test_string_conversion() {
        let err: SwitchboardError = "boom".into();
        assert_eq!(err.to_string(), "boom");
    }
}
