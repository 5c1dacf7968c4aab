//! Feature Compiler
//!
//! Wires the whole data flow together: feature descriptions are built into a
//! [`feature_engine::FeatureSet`], assembled into a dataflow model, lowered
//! into an IR module and optimized for a target. The result can be executed
//! sample by sample through a [`Session`].

mod compiler;
mod config;
mod error;

pub use compiler::{CompiledModel, FeatureCompiler, Session};
pub use crate::config::CompilerConfig;
pub use error::CompilerError;
