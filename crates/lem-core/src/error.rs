//! Error taxonomy shared by every stage of the model.
use std::path::PathBuf;
use thiserror::Error;

pub type LemResult<T> = Result<T, LemError>;

#[derive(Debug, Error)]
pub enum LemError {
    /// Degenerate or out-of-range physical parameters.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A state vector or grid does not match the configured grid shape.
    #[error("shape error: {what} has {actual} cells, expected {expected}")]
    Shape {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A grid's dimensions differ from the configured ones.
    #[error("shape error: {what} is {ny}x{nx}, expected {expected_ny}x{expected_nx}")]
    Dimensions {
        what: &'static str,
        expected_ny: usize,
        expected_nx: usize,
        ny: usize,
        nx: usize,
    },

    /// The rate field went non-finite; the run cannot continue meaningfully.
    #[error("numeric instability at t={t}: {detail}")]
    NumericInstability { t: f64, detail: String },

    #[error("integration failed: {0}")]
    Integration(String),

    #[error("i/o error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("serialization error on {path}: {source}")]
    Serialization {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LemError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        LemError::Configuration(msg.into())
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LemError::Io { path: path.into(), source }
    }
}
