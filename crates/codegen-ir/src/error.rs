//! IR Error Types

use crate::{BufferId, Reg};
use model_graph::GraphError;
use thiserror::Error;

/// Errors while lowering a model
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LowerError {
    /// Model has no input node
    #[error("Model has no input node")]
    NoInput,

    /// Input nodes disagree on the sample size
    #[error("Input node size mismatch: expected {expected}, got {actual}")]
    InputSizeMismatch { expected: usize, actual: usize },

    /// Nothing to compute
    #[error("Model output is empty")]
    EmptyOutput,

    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Errors while interpreting a module
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Register %{reg} used before definition in {function}")]
    UndefinedRegister { function: String, reg: Reg },

    #[error("Index {index} out of bounds for buffer {buffer} of length {len}")]
    OutOfBounds { buffer: BufferId, index: isize, len: usize },

    #[error("Lane count mismatch: {lhs} vs {rhs}")]
    LaneMismatch { lhs: usize, rhs: usize },

    #[error("Call depth exceeded {0}")]
    CallDepthExceeded(usize),

    #[error("Input size mismatch: expected {expected}, got {actual}")]
    InputSize { expected: usize, actual: usize },

    #[error("Module has no {0} buffer")]
    MissingBuffer(&'static str),
}
