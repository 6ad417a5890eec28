//! Error types for the longevity engine

use thiserror::Error;

/// Errors raised by any stage of a longevity analysis
///
/// All errors are fatal to the stage that raised them. Artefacts produced by
/// earlier stages (e.g. a fitted model) stay valid and can be reused.
#[derive(Error, Debug)]
pub enum LongevityError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch in {context}: expected {expected}, got {actual}")]
    DimensionMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

impl LongevityError {
    pub(crate) fn dimension(context: &str, expected: usize, actual: usize) -> Self {
        LongevityError::DimensionMismatch {
            context: context.to_string(),
            expected,
            actual,
        }
    }
}

pub type Result<T> = std::result::Result<T, LongevityError>;
