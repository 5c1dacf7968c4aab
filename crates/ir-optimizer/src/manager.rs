//! Pass Managers

use crate::passes::Verifier;
use crate::{FunctionContext, FunctionPass, ModulePass, OptimizerError};
use codegen_ir::{Function, Module};
use std::fmt;
use tracing::{debug, warn};

/// Ordered sequence of function passes
#[derive(Default)]
pub struct FunctionPassManager {
    passes: Vec<Box<dyn FunctionPass>>,
    verify_each: bool,
}

impl FunctionPassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pass to the end of the sequence
    pub fn add(&mut self, pass: Box<dyn FunctionPass>) {
        self.passes.push(pass);
    }

    /// Verify the function after every pass that changed it
    pub fn set_verify_each(&mut self, verify_each: bool) {
        self.verify_each = verify_each;
    }

    /// Number of passes in the sequence
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Pass names in run order
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Initialize every pass in order
    ///
    /// When a pass fails, the passes initialized before it are finalized in
    /// reverse order before the error is returned.
    pub fn initialize(&mut self, module: &Module) -> Result<(), OptimizerError> {
        for index in 0..self.passes.len() {
            if let Err(e) = self.passes[index].initialize(module) {
                for pass in self.passes[..index].iter_mut().rev() {
                    if let Err(rollback) = pass.finalize() {
                        warn!("Finalizing pass {} after failed initialization: {}", pass.name(), rollback);
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run every pass over one function
    pub fn run(&mut self, function: &mut Function, context: &FunctionContext<'_>) -> Result<bool, OptimizerError> {
        let mut changed = false;
        for pass in &mut self.passes {
            let pass_changed = pass.run(function, context)?;
            debug!("Pass {} on {}: changed={}", pass.name(), function.name, pass_changed);
            if pass_changed && self.verify_each {
                Verifier::verify_function(function, context)?;
            }
            changed |= pass_changed;
        }
        Ok(changed)
    }

    /// Run every pass over every function of `module`
    pub fn run_on_module(&mut self, module: &mut Module) -> Result<bool, OptimizerError> {
        let names: Vec<String> = module.functions.iter().map(|f| f.name.clone()).collect();
        let context = FunctionContext {
            buffers: &module.buffers,
            functions: &names,
        };
        let mut changed = false;
        for function in module.functions.iter_mut() {
            changed |= self.run(function, &context)?;
        }
        Ok(changed)
    }

    /// Finalize every pass, reporting the first failure after all have run
    pub fn finalize(&mut self) -> Result<(), OptimizerError> {
        let mut result = Ok(());
        for pass in &mut self.passes {
            if let Err(e) = pass.finalize() {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }
}

impl fmt::Debug for FunctionPassManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionPassManager")
            .field("passes", &self.pass_names())
            .field("verify_each", &self.verify_each)
            .finish()
    }
}

/// Ordered sequence of module passes
#[derive(Default)]
pub struct ModulePassManager {
    passes: Vec<Box<dyn ModulePass>>,
    verify_each: bool,
}

impl ModulePassManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pass to the end of the sequence
    pub fn add(&mut self, pass: Box<dyn ModulePass>) {
        self.passes.push(pass);
    }

    /// Verify the module after every pass that changed it
    pub fn set_verify_each(&mut self, verify_each: bool) {
        self.verify_each = verify_each;
    }

    /// Number of passes in the sequence
    pub fn len(&self) -> usize {
        self.passes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    /// Pass names in run order
    pub fn pass_names(&self) -> Vec<&'static str> {
        self.passes.iter().map(|p| p.name()).collect()
    }

    /// Run every pass over `module` in order
    pub fn run(&mut self, module: &mut Module) -> Result<bool, OptimizerError> {
        let mut changed = false;
        for pass in &mut self.passes {
            let before = module.instruction_count();
            let pass_changed = pass.run(module)?;
            debug!(
                "Pass {} on module {}: changed={} ({} -> {} instructions)",
                pass.name(),
                module.name,
                pass_changed,
                before,
                module.instruction_count()
            );
            if pass_changed && self.verify_each {
                Verifier::verify_module(module)?;
            }
            changed |= pass_changed;
        }
        Ok(changed)
    }
}

impl fmt::Debug for ModulePassManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModulePassManager")
            .field("passes", &self.pass_names())
            .field("verify_each", &self.verify_each)
            .finish()
    }
}

/// Runs a function pass sequence over every function as one module pass
///
/// The wrapped passes are initialized and finalized around each module run.
#[derive(Debug)]
pub struct FunctionPassAdaptor {
    passes: FunctionPassManager,
}

impl FunctionPassAdaptor {
    pub fn new(passes: FunctionPassManager) -> Self {
        Self { passes }
    }
}

impl ModulePass for FunctionPassAdaptor {
    fn name(&self) -> &'static str {
        "function-passes"
    }

    fn run(&mut self, module: &mut Module) -> Result<bool, OptimizerError> {
        self.passes.initialize(module)?;
        let changed = self.passes.run_on_module(module);
        let finalized = self.passes.finalize();
        let changed = changed?;
        finalized?;
        Ok(changed)
    }
}
