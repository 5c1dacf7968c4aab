//! Scoped Optimizer
//!
//! Binds a configured pipeline to one module. Construction is the only way
//! to configure it, and dropping it finalizes the function passes.

use crate::{
    FunctionContext, FunctionPassManager, ModulePassManager, OptimizerConfig, OptimizerError, PipelineBuilder,
    TargetDescriptor,
};
use codegen_ir::Module;
use tracing::{debug, info, warn};

/// Optimization pipeline bound to a module
///
/// Holds the module exclusively for its whole lifetime; use one optimizer
/// per module to compile modules in parallel.
pub struct Optimizer<'m> {
    module: &'m mut Module,
    function_passes: FunctionPassManager,
    module_passes: ModulePassManager,
    target: Option<String>,
    finalized: bool,
}

impl<'m> Optimizer<'m> {
    /// Build the pass pipeline for `module`
    ///
    /// A target gets to adjust the builder before the pass managers are
    /// populated; without one, generic code is produced. Function passes are
    /// initialized before this returns.
    pub fn configure(
        module: &'m mut Module,
        target: Option<&dyn TargetDescriptor>,
        config: &OptimizerConfig,
    ) -> Result<Self, OptimizerError> {
        config.validate()?;
        let mut builder = PipelineBuilder::from_config(config);
        if let Some(target) = target {
            target.adjust_pipeline(&mut builder);
            debug!("Target {} adjusted pipeline: {:?}", target.name(), builder);
        }

        let mut function_passes = FunctionPassManager::new();
        builder.populate_function_pass_manager(&mut function_passes);
        let mut module_passes = ModulePassManager::new();
        builder.populate_module_pass_manager(&mut module_passes);
        function_passes.initialize(module)?;

        info!(
            "Creating optimizer for module {} (O{}, size {}, target {}, {} function passes, {} module passes)",
            module.name,
            config.opt_level,
            config.size_level,
            target.map_or("generic", |t| t.name()),
            function_passes.len(),
            module_passes.len()
        );
        Ok(Self {
            module,
            function_passes,
            module_passes,
            target: target.map(|t| t.name().to_string()),
            finalized: false,
        })
    }

    /// Run the function pass sequence over one function of the bound module
    pub fn optimize_function(&mut self, name: &str) -> Result<bool, OptimizerError> {
        let index = self
            .module
            .function_index(name)
            .ok_or_else(|| OptimizerError::UnknownFunction(name.to_string()))?;
        let names: Vec<String> = self.module.functions.iter().map(|f| f.name.clone()).collect();
        let Module { buffers, functions, .. } = &mut *self.module;
        let context = FunctionContext {
            buffers: buffers.as_slice(),
            functions: &names,
        };
        self.function_passes.run(&mut functions[index], &context)
    }

    /// Run the module pass sequence over the bound module
    pub fn optimize_module(&mut self) -> Result<bool, OptimizerError> {
        let before = self.module.instruction_count();
        let changed = self.module_passes.run(self.module)?;
        info!(
            "Optimized module {}: {} -> {} instructions",
            self.module.name,
            before,
            self.module.instruction_count()
        );
        Ok(changed)
    }

    pub fn module(&self) -> &Module {
        &*self.module
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    /// Finalize now and report the outcome instead of logging it on drop
    pub fn finish(mut self) -> Result<(), OptimizerError> {
        self.finalize_once()
    }

    fn finalize_once(&mut self) -> Result<(), OptimizerError> {
        if self.finalized {
            return Ok(());
        }
        self.finalized = true;
        debug!("Finalizing function passes for module {}", self.module.name);
        self.function_passes.finalize()
    }
}

impl Drop for Optimizer<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.finalize_once() {
            warn!("Finalizing optimizer for module {} failed: {}", self.module.name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FunctionPass, TargetSpec};
    use codegen_ir::{lower_model, Function, LoweringOptions, Machine};
    use model_graph::{AccumulatorNode, BinaryNode, BinaryOp, ConstantNode, DelayNode, InputNode, Model};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Default)]
    struct Counters {
        initialized: AtomicUsize,
        runs: AtomicUsize,
        finalized: AtomicUsize,
    }

    struct CountingPass(Arc<Counters>);

    impl FunctionPass for CountingPass {
        fn name(&self) -> &'static str {
            "count"
        }

        fn initialize(&mut self, _module: &Module) -> Result<(), OptimizerError> {
            self.0.initialized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn run(&mut self, _function: &mut Function, _context: &FunctionContext<'_>) -> Result<bool, OptimizerError> {
            self.0.runs.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }

        fn finalize(&mut self) -> Result<(), OptimizerError> {
            self.0.finalized.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Adds a counting pass to every pipeline it tunes
    #[derive(Debug)]
    struct CountingTarget(Arc<Counters>);

    impl TargetDescriptor for CountingTarget {
        fn name(&self) -> &str {
            "counting"
        }

        fn vector_width(&self) -> usize {
            2
        }

        fn adjust_pipeline(&self, builder: &mut PipelineBuilder) {
            builder.vector_width = self.vector_width();
            let counters = self.0.clone();
            builder.add_function_extension(move || Box::new(CountingPass(counters.clone())) as Box<dyn FunctionPass>);
        }
    }

    struct FailingInit;

    impl FunctionPass for FailingInit {
        fn name(&self) -> &'static str {
            "failing-init"
        }

        fn initialize(&mut self, _module: &Module) -> Result<(), OptimizerError> {
            Err(OptimizerError::PassFailed {
                pass: "failing-init",
                message: "cannot initialize".into(),
            })
        }

        fn run(&mut self, _function: &mut Function, _context: &FunctionContext<'_>) -> Result<bool, OptimizerError> {
            Ok(false)
        }
    }

    /// Adds a counting pass followed by one that fails to initialize
    #[derive(Debug)]
    struct FailingTarget(Arc<Counters>);

    impl TargetDescriptor for FailingTarget {
        fn name(&self) -> &str {
            "failing"
        }

        fn vector_width(&self) -> usize {
            1
        }

        fn adjust_pipeline(&self, builder: &mut PipelineBuilder) {
            let counters = self.0.clone();
            builder.add_function_extension(move || Box::new(CountingPass(counters.clone())) as Box<dyn FunctionPass>);
            builder.add_function_extension(|| Box::new(FailingInit) as Box<dyn FunctionPass>);
        }
    }

    /// Running mean over 3 samples of a 6-wide input
    fn lowered() -> (Module, Model) {
        let mut model = Model::new();
        let input = model.emplace(InputNode::new(6)).unwrap();
        let delay = model.emplace(DelayNode::new(input.clone(), 4)).unwrap();
        let oldest = model.last_node().unwrap().as_delay().unwrap().delayed_output(&delay, 3).unwrap();
        let diff = model.emplace(BinaryNode::new(input, oldest, BinaryOp::Subtract)).unwrap();
        let sum = model.emplace(AccumulatorNode::new(diff)).unwrap();
        let n = model.emplace(ConstantNode::new(vec![3.0])).unwrap();
        let out = model
            .emplace(BinaryNode::new(sum, n.broadcast(6).unwrap(), BinaryOp::Divide))
            .unwrap();
        let module = lower_model(&model, &out, &LoweringOptions::default()).unwrap();
        (module, model)
    }

    #[test]
    fn test_finalizes_exactly_once() {
        let counters = Arc::new(Counters::default());
        let target = CountingTarget(counters.clone());
        let (mut module, _) = lowered();
        {
            let mut optimizer = Optimizer::configure(&mut module, Some(&target), &OptimizerConfig::debug()).unwrap();
            assert_eq!(counters.initialized.load(Ordering::SeqCst), 1);
            for _ in 0..3 {
                optimizer.optimize_function("features_predict").unwrap();
            }
            assert_eq!(counters.finalized.load(Ordering::SeqCst), 0);
        }
        assert_eq!(counters.runs.load(Ordering::SeqCst), 3);
        assert_eq!(counters.finalized.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_explicit_finish_is_not_repeated_on_drop() {
        let counters = Arc::new(Counters::default());
        let target = CountingTarget(counters.clone());
        let (mut module, _) = lowered();
        let optimizer = Optimizer::configure(&mut module, Some(&target), &OptimizerConfig::debug()).unwrap();
        optimizer.finish().unwrap();
        assert_eq!(counters.finalized.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_failed_configure_finalizes_initialized_passes() {
        let counters = Arc::new(Counters::default());
        let target = FailingTarget(counters.clone());
        let (mut module, _) = lowered();
        let result = Optimizer::configure(&mut module, Some(&target), &OptimizerConfig::debug());
        assert!(matches!(
            result,
            Err(OptimizerError::PassFailed {
                pass: "failing-init",
                ..
            })
        ));
        assert_eq!(counters.initialized.load(Ordering::SeqCst), 1);
        assert_eq!(counters.finalized.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unknown_function() {
        let (mut module, _) = lowered();
        let mut optimizer = Optimizer::configure(&mut module, None, &OptimizerConfig::default()).unwrap();
        assert_eq!(
            optimizer.optimize_function("missing"),
            Err(OptimizerError::UnknownFunction("missing".into()))
        );
    }

    #[test]
    fn test_invalid_config() {
        let (mut module, _) = lowered();
        let config = OptimizerConfig {
            size_level: 3,
            ..Default::default()
        };
        assert!(matches!(
            Optimizer::configure(&mut module, None, &config),
            Err(OptimizerError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_optimized_module_computes_the_same() {
        for (config, target) in [
            (OptimizerConfig::default(), None),
            (OptimizerConfig::default(), Some(TargetSpec::avx2())),
            (OptimizerConfig::size_optimized(), Some(TargetSpec::sse2())),
            (OptimizerConfig { opt_level: 3, ..Default::default() }, Some(TargetSpec::avx512())),
            (OptimizerConfig::debug(), None),
        ] {
            let (original, _) = lowered();
            let mut optimized = original.clone();
            {
                let mut optimizer =
                    Optimizer::configure(&mut optimized, target.as_ref().map(|t| t as &dyn TargetDescriptor), &config)
                        .unwrap();
                optimizer.optimize_module().unwrap();
                optimizer.optimize_function("features_predict").unwrap();
            }

            let mut expected = Machine::new(&original);
            let mut actual = Machine::new(&optimized);
            for step in 0..8 {
                let sample: Vec<f64> = (0..6).map(|i| (step * 6 + i) as f64 * 0.25).collect();
                let e = expected.run("features_predict", &sample).unwrap();
                let a = actual.run("features_predict", &sample).unwrap();
                assert_eq!(e, a, "{:?} {:?} step {}", config, target, step);
            }
        }
    }

    #[test]
    fn test_inlining_removes_internal_functions() {
        let (mut module, _) = lowered();
        let before = module.functions.len();
        {
            let mut optimizer = Optimizer::configure(&mut module, None, &OptimizerConfig::default()).unwrap();
            assert!(optimizer.optimize_module().unwrap());
            assert_eq!(optimizer.target(), None);
        }
        assert!(before > 1);
        assert_eq!(module.functions.len(), 1);
        assert!(module.functions[0].callees().is_empty());
    }
}
