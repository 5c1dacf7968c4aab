//! Code-Generation IR
//!
//! A small register IR for compiled models: modules of functions operating
//! on module-level buffers, with straight-line code and counted loops whose
//! memory accesses may span several vector lanes. Includes the lowering from
//! a [`model_graph::Model`] and an interpreter used to check that optimized
//! code still computes the same values.

mod error;
mod ir;
mod lower;
mod machine;

pub use error::{ExecError, LowerError};
pub use ir::{
    Buffer, BufferId, BufferKind, Function, InlineHint, Inst, Linkage, Loop, MemRef, Module, Operand, Reg,
};
pub use lower::{lower_model, node_function_name, predict_function_name, LoweringOptions};
pub use machine::{Machine, MAX_CALL_DEPTH};
pub use model_graph::BinaryOp;
