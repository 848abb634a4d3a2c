use crate::options::ExplainOptionsBuilderError;
use thiserror::Error;

/// Error types for the Kernel SHAP explainer.
#[derive(Debug, Error)]
pub enum KernelShapError {
    /// A matrix or table did not have the expected shape.
    #[error("invalid shape: expected {expected}, got {actual}")]
    InvalidShape { expected: String, actual: String },

    /// The prediction function returned something that isn't numeric.
    #[error("prediction function returned a non-numeric result")]
    InvalidPredictionKind,

    /// The prediction function returned the wrong number of rows.
    #[error("prediction shape mismatch: expected {expected_rows} rows, got {actual_rows}")]
    PredictionShapeMismatch {
        expected_rows: usize,
        actual_rows: usize,
    },

    /// The weighted system A_temp was singular even after pseudoinversion safeguards.
    #[error("linear system is singular")]
    SingularSystem,

    /// Background dataset has no rows.
    #[error("background dataset must have at least one row")]
    EmptyBackground,

    /// Row has zero features.
    #[error("row must have at least one feature")]
    TooFewFeatures,

    #[error("explain options build error: {0}")]
    OptionsBuild(#[from] ExplainOptionsBuilderError),
}

/// Result type alias for the Kernel SHAP crate.
pub type Result<T> = std::result::Result<T, KernelShapError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KernelShapError::InvalidShape {
            expected: "1x4".to_string(),
            actual: "2x4".to_string(),
        };
        assert_eq!(err.to_string(), "invalid shape: expected 1x4, got 2x4");

        let err = KernelShapError::InvalidPredictionKind;
        assert_eq!(
            err.to_string(),
            "prediction function returned a non-numeric result"
        );

        let err = KernelShapError::PredictionShapeMismatch {
            expected_rows: 16,
            actual_rows: 8,
        };
        assert_eq!(
            err.to_string(),
            "prediction shape mismatch: expected 16 rows, got 8"
        );

        let err = KernelShapError::SingularSystem;
        assert_eq!(err.to_string(), "linear system is singular");

        let err = KernelShapError::EmptyBackground;
        assert_eq!(
            err.to_string(),
            "background dataset must have at least one row"
        );

        let err = KernelShapError::TooFewFeatures;
        assert_eq!(err.to_string(), "row must have at least one feature");
    }
}
