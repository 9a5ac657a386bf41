//! Error types for the widedeep crate

use thiserror::Error;

/// Result type alias for widedeep operations
pub type Result<T> = std::result::Result<T, WideDeepError>;

/// Main error type for model assembly and forward orchestration
#[derive(Error, Debug)]
pub enum WideDeepError {
    /// Invalid combination of construction options. Raised at build time,
    /// never during a forward pass.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Declared widths of two wired components disagree.
    #[error("Dimension mismatch for {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    /// The batch is missing the input for a configured branch.
    #[error("Missing input for configured branch '{0}'")]
    MissingInput(String),

    /// The batch carries an input for a branch the model was not built with.
    #[error("Unexpected input for unconfigured branch '{0}'")]
    UnexpectedInput(String),

    /// The batch carries no inputs, or its inputs have zero rows, so there
    /// is nothing to run a forward pass on.
    #[error("Input batch is empty")]
    EmptyBatch,

    /// The smoothing path needs targets and the current epoch while training.
    #[error("Feature smoothing requires targets and an epoch during training")]
    MissingTargets,

    /// A sub-network collaborator failed during its forward pass.
    #[error("Component error: {0}")]
    ComponentError(String),

    #[error("Shape error: {0}")]
    ShapeError(String),
}

impl From<ndarray::ShapeError> for WideDeepError {
    fn from(err: ndarray::ShapeError) -> Self {
        WideDeepError::ShapeError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = WideDeepError::MissingInput("deeptext".to_string());
        assert_eq!(err.to_string(), "Missing input for configured branch 'deeptext'");
    }

    #[test]
    fn test_dimension_mismatch_display() {
        let err = WideDeepError::DimensionMismatch {
            context: "wide output width".to_string(),
            expected: 1,
            actual: 4,
        };
        assert_eq!(
            err.to_string(),
            "Dimension mismatch for wide output width: expected 1, got 4"
        );
    }
}
