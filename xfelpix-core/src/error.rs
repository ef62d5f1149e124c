//! Error types for xfelpix-core.

use thiserror::Error;

/// Result type alias for xfelpix operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for selection and reduction operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Construction from an unsupported source.
    #[error("invalid selection source: {0}")]
    InvalidSource(String),

    /// Binary operation between selections drawn from different stores.
    #[error("selections reference different stores")]
    IncompatibleSelection,

    /// Two sequences that must have equal length do not.
    #[error("{what} length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Array shapes cannot be combined elementwise.
    #[error("shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Detector configuration nodes are missing for a run.
    #[error("detector configuration not found for run {run:?}: {path}")]
    ConfigNotFound { run: Option<u64>, path: String },

    /// Malformed pattern string.
    #[error("pattern syntax error: {0}")]
    PatternSyntax(String),

    /// No dataset exists at the given path.
    #[error("dataset not found: {0}")]
    DatasetNotFound(String),

    /// Position outside of a selection.
    #[error("index {index} out of range for selection of length {len}")]
    IndexOutOfRange { index: isize, len: usize },

    /// Reduction over a selection without any dataset.
    #[error("cannot reduce an empty selection")]
    EmptySelection,

    /// Invalid configuration value.
    #[error("configuration error: {0}")]
    InvalidConfig(String),

    /// Failure reported by the store backend.
    #[error("store error: {0}")]
    Store(String),
}

impl Error {
    /// Builds a [`Error::ShapeMismatch`] from two shape slices.
    #[must_use]
    pub fn shape_mismatch(expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }
}
