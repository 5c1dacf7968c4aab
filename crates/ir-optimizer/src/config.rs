//! Optimizer configuration

use crate::OptimizerError;
use serde::{Deserialize, Serialize};

/// Optimizer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Optimization level, 0 to 3
    pub opt_level: u8,

    /// Size optimization level, 0 to 2
    pub size_level: u8,

    /// Widen parallel loops
    pub loop_vectorize: bool,

    /// Pack unrolled straight-line code
    pub slp_vectorize: bool,

    /// Vector lanes used when no target overrides it
    pub vector_width: usize,

    /// Verify after every pass that changed something
    pub verify_each: bool,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            opt_level: 2,
            size_level: 0,
            loop_vectorize: true,
            slp_vectorize: true,
            vector_width: 4,
            verify_each: false,
        }
    }
}

impl OptimizerConfig {
    /// Create size-optimized config (small inline threshold, no loop widening)
    pub fn size_optimized() -> Self {
        Self {
            size_level: 2,
            loop_vectorize: false,
            ..Default::default()
        }
    }

    /// Create debug config (no optimization, verify after every change)
    pub fn debug() -> Self {
        Self {
            opt_level: 0,
            loop_vectorize: false,
            slp_vectorize: false,
            verify_each: true,
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), OptimizerError> {
        if self.opt_level > 3 {
            return Err(OptimizerError::InvalidConfig(format!(
                "opt_level {} exceeds 3",
                self.opt_level
            )));
        }
        if self.size_level > 2 {
            return Err(OptimizerError::InvalidConfig(format!(
                "size_level {} exceeds 2",
                self.size_level
            )));
        }
        if self.vector_width == 0 {
            return Err(OptimizerError::InvalidConfig("vector_width must be positive".to_string()));
        }
        Ok(())
    }
}
