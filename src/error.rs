//! Error types for the training harness

use thiserror::Error;

/// Result type alias for harness operations
pub type Result<T> = std::result::Result<T, HarnessError>;

/// Main error type for the harness
#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("Model '{model}' failed to fit: {reason}")]
    ModelFit { model: String, reason: String },

    #[error("No viable model: {0}")]
    NoViableModel(String),

    #[error("Persistence error at {path}: {reason}")]
    Persistence { path: String, reason: String },

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Convergence failed after {iterations} iterations")]
    ConvergenceError { iterations: usize },

    #[error("Model not fitted")]
    ModelNotFitted,

    #[error("Duplicate model identifier: {0}")]
    DuplicateModel(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HarnessError {
    /// Shorthand for an `InvalidParameter` error
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        HarnessError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for HarnessError {
    fn from(err: serde_json::Error) -> Self {
        HarnessError::SerializationError(err.to_string())
    }
}

impl From<bincode::Error> for HarnessError {
    fn from(err: bincode::Error) -> Self {
        HarnessError::SerializationError(err.to_string())
    }
}

impl From<polars::error::PolarsError> for HarnessError {
    fn from(err: polars::error::PolarsError) -> Self {
        HarnessError::DataError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for HarnessError {
    fn from(err: ndarray::ShapeError) -> Self {
        HarnessError::ShapeMismatch {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HarnessError::InsufficientData("class 3 has 1 member".to_string());
        assert_eq!(err.to_string(), "Insufficient data: class 3 has 1 member");
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = HarnessError::invalid_parameter("n_neighbors", 0, "must be at least 1");
        assert_eq!(
            err.to_string(),
            "Invalid parameter: n_neighbors = 0, must be at least 1"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        let err: HarnessError = io_err.into();
        assert!(matches!(err, HarnessError::Io(_)));
    }
}
