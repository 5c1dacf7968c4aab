//! Compiler configuration

use crate::CompilerError;
use ::config::{Config, Environment, File};
use codegen_ir::LoweringOptions;
use ir_optimizer::{OptimizerConfig, TargetSpec};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Prefix of environment overrides, e.g. `FEATURE_COMPILER__OPTIMIZER__OPT_LEVEL`
pub const ENV_PREFIX: &str = "FEATURE_COMPILER";

/// Compiler configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Model lowering
    pub lowering: LoweringOptions,

    /// Pass pipeline
    pub optimizer: OptimizerConfig,

    /// Code-generation target; generic code when unset
    pub target: Option<TargetSpec>,
}

impl CompilerConfig {
    /// Smallest code, no loop vectorization
    pub fn size_optimized() -> Self {
        Self {
            optimizer: OptimizerConfig::size_optimized(),
            ..Default::default()
        }
    }

    /// No optimization, IR verified after every pass
    pub fn debug() -> Self {
        Self {
            optimizer: OptimizerConfig::debug(),
            ..Default::default()
        }
    }

    /// Load a config file, with `FEATURE_COMPILER__*` environment variables
    /// taking precedence
    ///
    /// Nested keys are separated by a double underscore. The file format is
    /// taken from its extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CompilerError> {
        let path = path.as_ref();
        let config: Self = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true))
            .build()?
            .try_deserialize()?;
        info!("Loaded compiler config from {}", path.display());
        Ok(config)
    }
}
