//! Error types for model loading and scoring

use std::fmt;
use thiserror::Error;

/// Result type for runtime operations
pub type Result<T> = std::result::Result<T, ScoringError>;

/// Errors raised while loading a model archive or scoring a row
#[derive(Error, Debug)]
pub enum ScoringError {
    /// Algorithm identifier missing from the archive or not registered
    #[error("Unsupported model algorithm: {}", .0.as_deref().unwrap_or("<missing>"))]
    UnsupportedAlgorithm(Option<String>),

    /// Required metadata entry or binary blob is absent or malformed
    #[error("Archive is corrupt: {0}")]
    ArchiveCorrupt(String),

    /// The model's backend could not be resolved at load time
    #[error("Backend '{0}' is unavailable")]
    BackendUnavailable(String),

    /// Input row does not match the model's declared encoding
    #[error("Feature row has {actual} values, expected {expected}")]
    FeatureShape { expected: usize, actual: usize },

    /// Engine output length disagrees with the model's class count
    #[error("Backend returned {actual} outputs, expected {expected}")]
    BackendContractViolation { expected: usize, actual: usize },

    /// Caller-supplied prediction buffer is too small
    #[error("Prediction buffer holds {actual} values, expected at least {expected}")]
    PredictionBuffer { expected: usize, actual: usize },

    /// Categorical level not present in the column's domain
    #[error("Unknown level '{level}' for categorical column '{column}'")]
    UnknownCategoricalLevel { column: String, level: String },

    /// Failure reported by the inference engine
    #[error("Backend failure: {0:#}")]
    Backend(#[source] anyhow::Error),

    /// I/O error while staging artifacts or reading the archive
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ScoringError {
    /// Create an archive corruption error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::ArchiveCorrupt(msg.into())
    }

    /// Create an unsupported algorithm error
    pub fn unsupported(algorithm: Option<&str>) -> Self {
        Self::UnsupportedAlgorithm(algorithm.map(str::to_string))
    }

    /// Create a feature shape error
    pub fn shape(expected: usize, actual: usize) -> Self {
        Self::FeatureShape { expected, actual }
    }
}

/// ErrorKind for categorizing errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Algorithm dispatch failed
    Algorithm,
    /// Archive contents are unusable
    Archive,
    /// Backend is missing or failed
    Backend,
    /// Caller input does not fit the model
    Input,
    /// Engine broke its output contract
    Contract,
    /// File or document I/O
    Io,
}

impl ScoringError {
    /// Get the kind of error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedAlgorithm(_) => ErrorKind::Algorithm,
            Self::ArchiveCorrupt(_) => ErrorKind::Archive,
            Self::BackendUnavailable(_) | Self::Backend(_) => ErrorKind::Backend,
            Self::FeatureShape { .. }
            | Self::PredictionBuffer { .. }
            | Self::UnknownCategoricalLevel { .. } => ErrorKind::Input,
            Self::BackendContractViolation { .. } => ErrorKind::Contract,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether the error only aborts the current scoring call.
    ///
    /// The model stays usable for later rows after these errors.
    pub fn is_per_call(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_)
                | Self::FeatureShape { .. }
                | Self::PredictionBuffer { .. }
                | Self::UnknownCategoricalLevel { .. }
                | Self::BackendContractViolation { .. }
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Algorithm => write!(f, "algorithm"),
            ErrorKind::Archive => write!(f, "archive"),
            ErrorKind::Backend => write!(f, "backend"),
            ErrorKind::Input => write!(f, "input"),
            ErrorKind::Contract => write!(f, "contract"),
            ErrorKind::Io => write!(f, "io"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ScoringError::unsupported(Some("K-Means"));
        assert_eq!(err.to_string(), "Unsupported model algorithm: K-Means");

        let err = ScoringError::unsupported(None);
        assert_eq!(err.to_string(), "Unsupported model algorithm: <missing>");

        let err = ScoringError::BackendContractViolation {
            expected: 2,
            actual: 1,
        };
        assert_eq!(err.to_string(), "Backend returned 1 outputs, expected 2");
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(ScoringError::corrupt("x").kind(), ErrorKind::Archive);
        assert_eq!(ScoringError::shape(3, 2).kind(), ErrorKind::Input);
        assert_eq!(
            ScoringError::BackendUnavailable("mxnet".into()).kind(),
            ErrorKind::Backend
        );
        assert_eq!(
            ScoringError::Backend(anyhow::anyhow!("boom")).kind(),
            ErrorKind::Backend
        );
    }

    #[test]
    fn test_per_call_errors() {
        assert!(ScoringError::shape(3, 2).is_per_call());
        assert!(ScoringError::BackendUnavailable("x".into()).is_per_call());
        assert!(!ScoringError::corrupt("x").is_per_call());
        assert!(!ScoringError::unsupported(None).is_per_call());
    }

    #[test]
    fn test_backend_error_keeps_context() {
        let inner = anyhow::anyhow!("missing tensor").context("loading parameters");
        let err = ScoringError::Backend(inner);
        let text = err.to_string();
        assert!(text.contains("loading parameters"));
        assert!(text.contains("missing tensor"));
    }
}
