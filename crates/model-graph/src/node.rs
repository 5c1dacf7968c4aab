//! Primitive Nodes

use crate::{CoordinateList, GraphError};
use serde::{Deserialize, Serialize};

/// Elementwise binary operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl BinaryOp {
    /// Apply the operation to two scalars
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            BinaryOp::Add => lhs + rhs,
            BinaryOp::Subtract => lhs - rhs,
            BinaryOp::Multiply => lhs * rhs,
            BinaryOp::Divide => lhs / rhs,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "sub",
            BinaryOp::Multiply => "mul",
            BinaryOp::Divide => "div",
        }
    }
}

/// Source of the per-sample input vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputNode {
    pub size: usize,
}

impl InputNode {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

/// Fixed values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantNode {
    pub values: Vec<f64>,
}

impl ConstantNode {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }
}

/// Shift register holding the last `window` input vectors
///
/// The output is `window` blocks of the input width, newest first. Blocks
/// that have not been filled yet read as zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayNode {
    pub input: CoordinateList,
    pub window: usize,
}

impl DelayNode {
    pub fn new(input: CoordinateList, window: usize) -> Self {
        Self { input, window }
    }

    /// Width of one stored sample
    pub fn sample_size(&self) -> usize {
        self.input.len()
    }

    /// Coordinates of the sample delayed by `delay` steps within `output`,
    /// the handle returned when this node was emplaced
    pub fn delayed_output(&self, output: &CoordinateList, delay: usize) -> Result<CoordinateList, GraphError> {
        if delay >= self.window {
            return Err(GraphError::InvalidDelay { delay, window: self.window });
        }
        let size = self.sample_size();
        output.slice(delay * size, size).ok_or(GraphError::InvalidDelay {
            delay,
            window: self.window,
        })
    }
}

/// `lhs op rhs`, element by element
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BinaryNode {
    pub lhs: CoordinateList,
    pub rhs: CoordinateList,
    pub op: BinaryOp,
}

impl BinaryNode {
    pub fn new(lhs: CoordinateList, rhs: CoordinateList, op: BinaryOp) -> Self {
        Self { lhs, rhs, op }
    }
}

/// Running sum of its input over all steps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccumulatorNode {
    pub input: CoordinateList,
}

impl AccumulatorNode {
    pub fn new(input: CoordinateList) -> Self {
        Self { input }
    }
}

/// A node in the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Node {
    Input(InputNode),
    Constant(ConstantNode),
    Delay(DelayNode),
    Binary(BinaryNode),
    Accumulator(AccumulatorNode),
}

impl Node {
    /// Number of output elements, fixed at construction
    pub fn output_size(&self) -> usize {
        match self {
            Node::Input(n) => n.size,
            Node::Constant(n) => n.values.len(),
            Node::Delay(n) => n.input.len() * n.window,
            Node::Binary(n) => n.lhs.len(),
            Node::Accumulator(n) => n.input.len(),
        }
    }

    /// Upstream handles consumed by this node
    pub fn inputs(&self) -> Vec<&CoordinateList> {
        match self {
            Node::Input(_) | Node::Constant(_) => Vec::new(),
            Node::Delay(n) => vec![&n.input],
            Node::Binary(n) => vec![&n.lhs, &n.rhs],
            Node::Accumulator(n) => vec![&n.input],
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Node::Input(_) => "input",
            Node::Constant(_) => "constant",
            Node::Delay(_) => "delay",
            Node::Binary(_) => "binary",
            Node::Accumulator(_) => "accumulator",
        }
    }

    pub fn as_delay(&self) -> Option<&DelayNode> {
        match self {
            Node::Delay(n) => Some(n),
            _ => None,
        }
    }

    /// Shape checks that do not need the rest of the model
    pub(crate) fn check_shape(&self) -> Result<(), GraphError> {
        match self {
            Node::Input(n) if n.size == 0 => Err(GraphError::EmptyNode("input")),
            Node::Constant(n) if n.values.is_empty() => Err(GraphError::EmptyNode("constant")),
            Node::Delay(n) if n.input.is_empty() => Err(GraphError::EmptyNode("delay")),
            Node::Delay(n) if n.window == 0 => Err(GraphError::InvalidDelay { delay: 0, window: 0 }),
            Node::Accumulator(n) if n.input.is_empty() => Err(GraphError::EmptyNode("accumulator")),
            Node::Binary(n) if n.lhs.is_empty() => Err(GraphError::EmptyNode("binary")),
            Node::Binary(n) if n.lhs.len() != n.rhs.len() => Err(GraphError::WidthMismatch {
                lhs: n.lhs.len(),
                rhs: n.rhs.len(),
            }),
            _ => Ok(()),
        }
    }
}

macro_rules! impl_from_node {
    ($($variant:ident($ty:ty)),*) => {
        $(impl From<$ty> for Node {
            fn from(node: $ty) -> Self {
                Node::$variant(node)
            }
        })*
    };
}

impl_from_node!(
    Input(InputNode),
    Constant(ConstantNode),
    Delay(DelayNode),
    Binary(BinaryNode),
    Accumulator(AccumulatorNode)
);
