//! Feature Error Types

use crate::FeatureId;
use model_graph::GraphError;
use ring_buffer::BufferError;
use thiserror::Error;

/// Errors raised while building, evaluating or compiling features
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureError {
    /// Sample cannot be processed (zero or unexpected dimension)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Upstream feature has no entry in the compiled-output mapping
    #[error("Feature {feature} is missing compiled output for input #{input}")]
    MissingInput { feature: String, input: FeatureId },

    /// Description names a feature that has not been declared before it
    #[error("Unresolved feature reference: {0}")]
    UnresolvedReference(String),

    /// Description field could not be parsed
    #[error("Malformed parameter {name}: {value:?}")]
    MalformedParameter { name: &'static str, value: String },

    /// Internal invariant broken
    #[error("Illegal state: {0}")]
    IllegalState(String),

    /// Kind tag not present in the registry
    #[error("Unknown feature kind: {0}")]
    UnknownKind(String),

    /// Id already taken in the feature set
    #[error("Duplicate feature id: {0}")]
    DuplicateId(String),

    #[error(transparent)]
    Buffer(#[from] BufferError),

    #[error(transparent)]
    Graph(#[from] GraphError),
}
