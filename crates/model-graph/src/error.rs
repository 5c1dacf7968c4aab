//! Graph Error Types

use crate::NodeId;
use thiserror::Error;

/// Errors raised while building or executing a model
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// Coordinate refers to a node that is not (yet) in the model
    #[error("Unknown node {0}")]
    UnknownNode(NodeId),

    /// Coordinate element exceeds the node's output size
    #[error("Element {element} out of range for node {node} of size {size}")]
    ElementOutOfRange { node: NodeId, element: usize, size: usize },

    /// Elementwise operands have different widths
    #[error("Operand width mismatch: {lhs} vs {rhs}")]
    WidthMismatch { lhs: usize, rhs: usize },

    /// Handle cannot be broadcast to the requested width
    #[error("Cannot broadcast {len} coordinates to width {width}")]
    BroadcastMismatch { len: usize, width: usize },

    /// Delay tap outside the shift register
    #[error("Delay {delay} out of range for window {window}")]
    InvalidDelay { delay: usize, window: usize },

    /// Node was given no inputs or no values
    #[error("Empty {0} node")]
    EmptyNode(&'static str),

    /// Sample fed to the executor has the wrong size
    #[error("Input size mismatch: expected {expected}, got {actual}")]
    InputSize { expected: usize, actual: usize },

    /// Model has no input node to feed
    #[error("Model has no input node")]
    NoInputNode,
}
