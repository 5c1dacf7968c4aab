//! Compiler Facade

use crate::{CompilerConfig, CompilerError};
use codegen_ir::{lower_model, predict_function_name, ExecError, Machine, Module};
use feature_engine::FeatureSet;
use ir_optimizer::{Optimizer, TargetDescriptor};
use tracing::{debug, info};

/// Builds feature sets into optimized modules
#[derive(Debug, Clone, Default)]
pub struct FeatureCompiler {
    config: CompilerConfig,
}

impl FeatureCompiler {
    pub fn new(config: CompilerConfig) -> Self {
        info!(
            "Creating feature compiler (module {}, O{}, target {})",
            config.lowering.module_name,
            config.optimizer.opt_level,
            config.target.as_ref().map_or("generic", |t| t.name.as_str())
        );
        Self { config }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    /// Build the features from descriptions and compile them
    pub fn compile_descriptions<D, S>(
        &self,
        descriptions: impl IntoIterator<Item = D>,
    ) -> Result<CompiledModel, CompilerError>
    where
        D: AsRef<[S]>,
        S: AsRef<str>,
    {
        let set = FeatureSet::from_descriptions(descriptions)?;
        self.compile(&set)
    }

    /// Compile the output of the last feature in `set`
    ///
    /// The eager state of the set is not touched.
    pub fn compile(&self, set: &FeatureSet) -> Result<CompiledModel, CompilerError> {
        let compiled = set.build_model()?;
        let mut module = lower_model(&compiled.model, &compiled.output, &self.config.lowering)?;
        debug!("Lowered {} nodes to {} instructions", compiled.model.len(), module.instruction_count());

        let target = self.config.target.as_ref().map(|t| t as &dyn TargetDescriptor);
        let mut optimizer = Optimizer::configure(&mut module, target, &self.config.optimizer)?;
        optimizer.optimize_module()?;
        optimizer.finish()?;

        let input_size = compiled.model.input_size().unwrap_or_default();
        let output_size = compiled.output.len();
        info!(
            "Compiled {} features into module {} ({} functions, {} instructions)",
            set.len(),
            module.name,
            module.functions.len(),
            module.instruction_count()
        );
        Ok(CompiledModel {
            entry: predict_function_name(&module.name),
            module,
            input_size,
            output_size,
        })
    }
}

/// Optimized module together with its entry point
#[derive(Debug, Clone)]
pub struct CompiledModel {
    pub module: Module,
    pub entry: String,
    pub input_size: usize,
    pub output_size: usize,
}

impl CompiledModel {
    /// Fresh execution state, as if no sample had been seen
    pub fn session(&self) -> Session<'_> {
        Session {
            machine: Machine::new(&self.module),
            entry: &self.entry,
        }
    }
}

/// Streaming execution of a compiled model
#[derive(Debug)]
pub struct Session<'m> {
    machine: Machine<'m>,
    entry: &'m str,
}

impl Session<'_> {
    /// Feed one sample and return the output of the last feature
    pub fn predict(&mut self, sample: &[f64]) -> Result<Vec<f64>, ExecError> {
        self.machine.run(self.entry, sample)
    }

    /// Samples processed since creation or the last reset
    pub fn samples(&self) -> u64 {
        self.machine.runs()
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.machine.reset();
    }
}
