//! Dataflow Model
//!
//! An append-only DAG of primitive operation nodes (input, constant, delay,
//! elementwise binary op, running accumulator). Nodes are addressed through
//! coordinate lists, so one node's output can be sliced, broadcast and shared
//! by any number of consumers.

mod coordinates;
mod error;
mod executor;
mod model;
mod node;

pub use coordinates::{AffineRange, Coordinate, CoordinateList, NodeId};
pub use error::GraphError;
pub use executor::ModelExecutor;
pub use model::Model;
pub use node::{AccumulatorNode, BinaryNode, BinaryOp, ConstantNode, DelayNode, InputNode, Node};
