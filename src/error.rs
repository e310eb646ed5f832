//! Error types for ocean-qc
//!
//! Three outcomes exist for a QC test: it applies and returns flags, it does
//! not apply (an empty [`TestResult`](crate::runner::TestResult), never an
//! error), or it fails. Failures split into data-integrity errors that abort
//! the current dataset and everything else.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// ocean-qc error types
#[derive(Error, Debug)]
pub enum Error {
    /// Candidate flags do not match the shape of the flags they are merged into
    #[error("Shape mismatch: expected {expected} samples, got {actual}")]
    ShapeMismatch {
        /// Number of samples in the current series
        expected: usize,
        /// Number of samples in the candidate series
        actual: usize,
    },

    /// Data-integrity failure raised by a test; aborts the dataset
    #[error("Fatal QC failure in {test} on {variable}: {reason}")]
    Fatal {
        /// Test that raised the failure
        test: String,
        /// Variable under test
        variable: String,
        /// Human readable reason
        reason: String,
    },

    /// Error surfaced by a test invocation, annotated with test and variable
    #[error("Test {test} failed on {variable}: {source}")]
    TestFailed {
        /// Test that failed
        test: String,
        /// Variable under test
        variable: String,
        /// Underlying error
        #[source]
        source: Box<Error>,
    },

    /// Invalid argument or malformed input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Configuration error (parameter files, flag schemes)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error (Parquet/Arrow)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Arrow/Parquet error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build a [`Error::Fatal`] for the given test and variable.
    #[must_use]
    pub fn fatal(
        test: impl Into<String>,
        variable: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Fatal {
            test: test.into(),
            variable: variable.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error must abort QC of the current dataset.
    ///
    /// Shape mismatches during flag fusion count as data-integrity failures.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Fatal { .. } | Self::ShapeMismatch { .. } => true,
            Self::TestFailed { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Test and variable names attached to the error, if any.
    #[must_use]
    pub fn location(&self) -> Option<(&str, &str)> {
        match self {
            Self::Fatal { test, variable, .. } | Self::TestFailed { test, variable, .. } => {
                Some((test.as_str(), variable.as_str()))
            }
            _ => None,
        }
    }
}
