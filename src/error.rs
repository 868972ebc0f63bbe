//! Error taxonomy for the analysis pipeline.
//!
//! Cleaning and design errors abort a run. A `Convergence` error is fatal
//! only for the model being fit, and `InvalidInput` only for the call that
//! received the malformed input.

use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Errors raised while cleaning, designing, fitting or diagnosing.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A requested or required column is absent from the source table.
    #[error("Schema error: {0}")]
    Schema(String),

    /// A raw survey code has no entry in the field's recoding table.
    #[error("Unrecognized code '{code}' in field '{field}'")]
    UnrecognizedCode { field: String, code: String },

    /// The sampling metadata cannot support design-based inference.
    #[error("Survey design error: {0}")]
    Design(String),

    /// The iterative fit did not converge or hit a singular system.
    #[error("Model '{model}' did not converge after {iterations} iteration(s): {reason}")]
    Convergence {
        model: String,
        iterations: usize,
        reason: String,
    },

    /// Malformed input to a diagnostics function.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Polars(#[from] polars::prelude::PolarsError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl AnalysisError {
    /// True for errors that invalidate the whole run rather than a single model.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            AnalysisError::Convergence { .. } | AnalysisError::InvalidInput(_)
        )
    }
}
