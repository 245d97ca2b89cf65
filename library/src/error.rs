use thiserror::Error;

use crate::node::NodeId;
use crate::plug::PlugId;
use crate::value::ValueType;

/// Errors raised by graph edits and evaluation requests.
///
/// The type is `Clone` because a failed computation is handed to every caller
/// that was waiting on the same in-flight hash.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),
    #[error("Plug not found: {0}")]
    PlugNotFound(String),
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("Connecting {from} to {to} would create a cycle")]
    Cycle { from: PlugId, to: PlugId },
    #[error("Type mismatch on {plug}: expected {expected}, got {actual}")]
    TypeMismatch {
        plug: String,
        expected: ValueType,
        actual: ValueType,
    },
    #[error("Invalid connection: {0}")]
    InvalidConnection(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Missing context variable: {0}")]
    MissingContextVariable(String),
    #[error("Compute error on {plug}: {message}")]
    Compute { plug: String, message: String },
    #[error("Computation cancelled")]
    Cancelled,
    #[error("Cache invariant violated: {0}")]
    CacheInvariant(String),
}

impl GraphError {
    pub fn compute(plug: impl Into<String>, message: impl Into<String>) -> Self {
        GraphError::Compute {
            plug: plug.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        GraphError::InvalidArgument(message.into())
    }

    /// True for errors that are the requester's own doing and must not be
    /// handed to other callers waiting on the same computation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, GraphError::Cancelled)
    }
}

/// Errors raised while loading or saving [`EngineConfig`](crate::config::EngineConfig).
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("TOML serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
