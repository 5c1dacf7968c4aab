//! Optimizer Error Types

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizerError {
    /// IR failed structural checks
    #[error("Verification failed in {function}: {message}")]
    Verification { function: String, message: String },

    #[error("Pass {pass} failed: {message}")]
    PassFailed { pass: &'static str, message: String },

    /// Function is not part of the bound module
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Finalization of {pass} failed: {message}")]
    Finalization { pass: &'static str, message: String },

    #[error("Invalid optimizer configuration: {0}")]
    InvalidConfig(String),
}

impl OptimizerError {
    pub(crate) fn verification(function: &str, message: impl Into<String>) -> Self {
        OptimizerError::Verification {
            function: function.to_string(),
            message: message.into(),
        }
    }
}
