//! IR Optimizer
//!
//! Pass infrastructure for [`codegen_ir::Module`]s:
//! - Function and module pass traits with managers that run them in order
//! - `PipelineBuilder` choosing passes from optimization and size levels
//! - Target descriptors that tune the pipeline before it is populated
//! - `Optimizer`, a scoped pipeline bound to one module that finalizes its
//!   passes exactly once when dropped

mod builder;
mod config;
mod error;
mod manager;
mod optimizer;
mod pass;
pub mod passes;
mod target;

pub use builder::{inline_threshold, PipelineBuilder};
pub use config::OptimizerConfig;
pub use error::OptimizerError;
pub use manager::{FunctionPassAdaptor, FunctionPassManager, ModulePassManager};
pub use optimizer::Optimizer;
pub use pass::{FunctionContext, FunctionPass, ModulePass};
pub use target::{TargetDescriptor, TargetSpec};
