//! Target Descriptors

use crate::PipelineBuilder;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Code-generation target
///
/// Gets a chance to tune the pipeline before the pass managers are
/// populated.
pub trait TargetDescriptor: fmt::Debug {
    fn name(&self) -> &str;

    /// Native vector lanes for `f64`
    fn vector_width(&self) -> usize;

    fn adjust_pipeline(&self, builder: &mut PipelineBuilder) {
        builder.vector_width = self.vector_width();
        if builder.vector_width < 2 {
            builder.loop_vectorize = false;
            builder.slp_vectorize = false;
        }
    }
}

/// Target described by name and vector width
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetSpec {
    pub name: String,
    pub vector_width: usize,
}

impl TargetSpec {
    pub fn new(name: impl Into<String>, vector_width: usize) -> Self {
        Self {
            name: name.into(),
            vector_width,
        }
    }

    /// No vector unit
    pub fn scalar() -> Self {
        Self::new("scalar", 1)
    }

    /// 128-bit vectors
    pub fn sse2() -> Self {
        Self::new("sse2", 2)
    }

    /// 256-bit vectors
    pub fn avx2() -> Self {
        Self::new("avx2", 4)
    }

    /// 512-bit vectors
    pub fn avx512() -> Self {
        Self::new("avx512", 8)
    }
}

impl TargetDescriptor for TargetSpec {
    fn name(&self) -> &str {
        &self.name
    }

    fn vector_width(&self) -> usize {
        self.vector_width
    }
}
