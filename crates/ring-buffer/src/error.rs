//! Buffer Error Types

use thiserror::Error;

/// Errors reported by the sample buffer
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Sample dimension differs from the dimension fixed by the first sample
    #[error("Sample dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A window must hold at least one sample
    #[error("Window capacity must be at least 1")]
    ZeroCapacity,
}
