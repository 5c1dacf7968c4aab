//! Compiler Error Types

use codegen_ir::{ExecError, LowerError};
use feature_engine::FeatureError;
use ir_optimizer::OptimizerError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("Feature error: {0}")]
    Feature(#[from] FeatureError),

    #[error("Lowering error: {0}")]
    Lower(#[from] LowerError),

    #[error("Optimizer error: {0}")]
    Optimizer(#[from] OptimizerError),

    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),
}
