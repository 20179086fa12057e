//! Error types for the salescast library.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, ForecastError>;

/// Errors that can occur while splitting, fitting, combining or scoring.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ForecastError {
    /// Input data is empty.
    #[error("empty input data")]
    EmptyData,

    /// Insufficient data points for the operation.
    #[error("insufficient data: need at least {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    /// Invalid parameter value.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// Dimension mismatch between data structures.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Date-related error.
    #[error("date error: {0}")]
    DateError(String),

    /// A named value column is not present in the panel.
    #[error("missing column: {0}")]
    MissingColumn(String),

    /// The table has no `cutoff_date` column where one is required.
    #[error("table has no cutoff_date column")]
    MissingCutoff,

    /// Two rows share the same key.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    /// Sibling prediction panels do not share the same key population.
    #[error("join mismatch: row counts {0:?}")]
    JoinMismatch(Vec<usize>),

    /// A series has no classification entry.
    #[error("no classification for series {0}")]
    MissingClassification(String),

    /// Model has not been fitted yet.
    #[error("model must be fitted before prediction")]
    FitRequired,

    /// Configuration could not be parsed or is inconsistent.
    #[error("configuration error: {0}")]
    Config(String),

    /// Reading or writing a file failed.
    #[error("io error: {0}")]
    Io(String),

    /// A CSV record could not be parsed.
    #[error("csv error: {0}")]
    Csv(String),

    /// Computation error (e.g., numerical issues).
    #[error("computation error: {0}")]
    ComputationError(String),
}

impl From<std::io::Error> for ForecastError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

impl From<toml::de::Error> for ForecastError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
