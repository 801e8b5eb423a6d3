//! Error types for the SVM engine

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SVMError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Invalid label: {0}")]
    InvalidLabel(f64),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Empty dataset")]
    EmptyDataset,

    #[error("Kernel evaluation failed: {0}")]
    KernelEvaluation(String),

    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("Model not trained")]
    ModelNotTrained,

    #[error("Probability estimates requested but the model was fitted without probability")]
    ProbabilityNotFitted,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Coarse classification of [`SVMError`] values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unknown kernel, bad hyperparameter, invalid class weight, missing probability fit
    Configuration,
    /// Mismatched shapes, malformed sparse rows, bad labels
    Data,
    /// Memory budget or allocation failures
    Resource,
    /// A subproblem entered the Failed state
    Solver,
    /// File access or model file corruption
    Io,
}

impl SVMError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SVMError::InvalidParameter(_)
            | SVMError::ModelNotTrained
            | SVMError::ProbabilityNotFitted => ErrorKind::Configuration,
            SVMError::InvalidDataset(_)
            | SVMError::InvalidLabel(_)
            | SVMError::DimensionMismatch { .. }
            | SVMError::EmptyDataset => ErrorKind::Data,
            SVMError::ResourceExhausted(_) => ErrorKind::Resource,
            SVMError::KernelEvaluation(_) => ErrorKind::Solver,
            SVMError::IoError(_) | SVMError::ParseError(_) | SVMError::SerializationError(_) => {
                ErrorKind::Io
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, SVMError>;
