//! Error types for model learning and inference.

use thiserror::Error;

impl From<csv::Error> for TriageError {
    fn from(err: csv::Error) -> Self {
        match err.position() {
            Some(pos) => TriageError::DataFormat(format!("line {}: {}", pos.line(), err)),
            None => TriageError::DataFormat(err.to_string()),
        }
    }
}

impl From<std::io::Error> for TriageError {
    fn from(err: std::io::Error) -> Self {
        TriageError::DataFormat(format!("failed to read dataset: {}", err))
    }
}

/// Errors that can occur while loading data, learning a network, or querying it.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// Learning-phase errors abort model construction; no partially learned model
/// is ever returned. Per-query errors are surfaced to the caller, except inside
/// the triage agent where they degrade to "no prediction available".
#[non_exhaustive]
#[derive(Debug, Error)]
pub enum TriageError {
    /// Malformed input table: missing or non-binary symptom values, missing target column.
    #[error("data format error: {0}")]
    DataFormat(String),

    /// Invalid DAG edit (cycle, self loop, duplicate edge, unknown variable).
    #[error("structure error: {0}")]
    Structure(String),

    /// A CPT disagrees with the DAG it is attached to.
    #[error("inconsistent structure: {0}")]
    InconsistentStructure(String),

    /// Query against an unknown variable or an impossible evidence combination.
    #[error("inference error: {0}")]
    Inference(String),

    /// Invalid configuration value.
    #[error("validation error: {0}")]
    Validation(String),

    /// Numerical stability error (NaN/Inf, invalid probabilities).
    #[error("numerical error: {0}")]
    Numerical(String),

    /// Internal error (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}

