//! Pass Traits

use crate::OptimizerError;
use codegen_ir::{Buffer, BufferId, Function, Module};

/// Read-only view of the module around the function being optimized
#[derive(Debug, Clone, Copy)]
pub struct FunctionContext<'a> {
    pub buffers: &'a [Buffer],
    pub functions: &'a [String],
}

impl<'a> FunctionContext<'a> {
    pub fn buffer(&self, id: BufferId) -> Option<&'a Buffer> {
        self.buffers.get(id)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.iter().any(|f| f == name)
    }
}

/// Transformation of a single function
///
/// `initialize` runs once before the first function, `finalize` once after
/// the last.
pub trait FunctionPass {
    fn name(&self) -> &'static str;

    fn initialize(&mut self, _module: &Module) -> Result<(), OptimizerError> {
        Ok(())
    }

    /// Returns whether the function changed
    fn run(&mut self, function: &mut Function, context: &FunctionContext<'_>) -> Result<bool, OptimizerError>;

    fn finalize(&mut self) -> Result<(), OptimizerError> {
        Ok(())
    }
}

/// Transformation of a whole module
pub trait ModulePass {
    fn name(&self) -> &'static str;

    /// Returns whether the module changed
    fn run(&mut self, module: &mut Module) -> Result<bool, OptimizerError>;
}
