//! Pipeline Builder

use crate::passes::{
    ConstantFolding, DeadCodeElimination, DeadStoreElimination, GlobalDce, Inliner, LoopVectorizer, SlpVectorizer,
    Verifier,
};
use crate::{FunctionPass, FunctionPassAdaptor, FunctionPassManager, ModulePass, ModulePassManager, OptimizerConfig};
use std::fmt;

type FunctionPassFactory = Box<dyn Fn() -> Box<dyn FunctionPass>>;
type ModulePassFactory = Box<dyn Fn() -> Box<dyn ModulePass>>;

/// Inliner threshold for an optimization and size level
///
/// `None` at level 0, where only callees marked `Always` are inlined.
pub fn inline_threshold(opt_level: u8, size_level: u8) -> Option<usize> {
    match (opt_level, size_level) {
        (0, _) => None,
        (o, _) if o > 2 => Some(250),
        (_, 1) => Some(75),
        (_, s) if s >= 2 => Some(25),
        _ => Some(225),
    }
}

/// Decides which passes go into the function and module pass managers
pub struct PipelineBuilder {
    pub opt_level: u8,
    pub size_level: u8,
    pub inline_threshold: Option<usize>,
    pub loop_vectorize: bool,
    pub slp_vectorize: bool,
    pub vector_width: usize,
    pub verify_each: bool,
    function_extensions: Vec<FunctionPassFactory>,
    module_extensions: Vec<ModulePassFactory>,
}

impl PipelineBuilder {
    pub fn new(opt_level: u8, size_level: u8) -> Self {
        Self {
            opt_level,
            size_level,
            inline_threshold: inline_threshold(opt_level, size_level),
            loop_vectorize: false,
            slp_vectorize: false,
            vector_width: 1,
            verify_each: false,
            function_extensions: Vec::new(),
            module_extensions: Vec::new(),
        }
    }

    pub fn from_config(config: &OptimizerConfig) -> Self {
        let mut builder = Self::new(config.opt_level, config.size_level);
        builder.loop_vectorize = config.loop_vectorize;
        builder.slp_vectorize = config.slp_vectorize;
        builder.vector_width = config.vector_width;
        builder.verify_each = config.verify_each;
        builder
    }

    /// Add a function pass after the vectorizers
    ///
    /// The factory is called once for each pass manager being populated.
    pub fn add_function_extension(&mut self, factory: impl Fn() -> Box<dyn FunctionPass> + 'static) {
        self.function_extensions.push(Box::new(factory));
    }

    /// Add a module pass before the final verification
    pub fn add_module_extension(&mut self, factory: impl Fn() -> Box<dyn ModulePass> + 'static) {
        self.module_extensions.push(Box::new(factory));
    }

    pub fn populate_function_pass_manager(&self, manager: &mut FunctionPassManager) {
        manager.set_verify_each(self.verify_each);
        manager.add(Box::new(Verifier::new()));
        self.add_simplification(manager);
    }

    /// verify, inline, global DCE, per-function simplification, dead scratch
    /// stores, extensions, verify
    pub fn populate_module_pass_manager(&self, manager: &mut ModulePassManager) {
        manager.set_verify_each(self.verify_each);
        manager.add(Box::new(Verifier::new()));
        manager.add(Box::new(Inliner::new(self.inline_threshold)));
        manager.add(Box::new(GlobalDce::new()));

        let mut per_function = FunctionPassManager::new();
        per_function.set_verify_each(self.verify_each);
        self.add_simplification(&mut per_function);
        if !per_function.is_empty() {
            manager.add(Box::new(FunctionPassAdaptor::new(per_function)));
        }

        if self.opt_level > 0 {
            manager.add(Box::new(DeadStoreElimination::new()));
        }
        for factory in &self.module_extensions {
            manager.add(factory());
        }
        manager.add(Box::new(Verifier::new()));
    }

    fn add_simplification(&self, manager: &mut FunctionPassManager) {
        let vectorize = self.opt_level > 0 && self.vector_width > 1;
        if self.opt_level > 0 {
            manager.add(Box::new(ConstantFolding::new()));
        }
        if vectorize && self.loop_vectorize {
            manager.add(Box::new(LoopVectorizer::new(self.vector_width)));
        }
        if vectorize && self.slp_vectorize {
            manager.add(Box::new(SlpVectorizer::new(self.vector_width)));
        }
        for factory in &self.function_extensions {
            manager.add(factory());
        }
        if self.opt_level > 0 {
            manager.add(Box::new(DeadCodeElimination::new()));
        }
    }
}

impl fmt::Debug for PipelineBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineBuilder")
            .field("opt_level", &self.opt_level)
            .field("size_level", &self.size_level)
            .field("inline_threshold", &self.inline_threshold)
            .field("loop_vectorize", &self.loop_vectorize)
            .field("slp_vectorize", &self.slp_vectorize)
            .field("vector_width", &self.vector_width)
            .field("verify_each", &self.verify_each)
            .field("function_extensions", &self.function_extensions.len())
            .field("module_extensions", &self.module_extensions.len())
            .finish()
    }
}
